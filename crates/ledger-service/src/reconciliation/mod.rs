//! 订单对账模块
//!
//! 后台驱动 NEW 订单经过 accrual 查询，并把结果原子地落到订单与余额上。

mod worker;

pub use worker::{ReconciliationWorker, TickOutcome, WorkerState};
