//! 领域模型定义

mod enums;
mod ledger;

pub use enums::OrderStatus;
pub use ledger::{ApplyOutcome, Balance, Order, User, Withdrawal};
