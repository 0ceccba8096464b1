//! 服务层
//!
//! 请求层调用的账本协调逻辑。
//!
//! ## 模块结构
//!
//! - `dto`: 数据传输对象定义
//! - `ledger_service`: 账本服务（注册、登录、订单、余额、提现）

pub mod dto;
mod ledger_service;

pub use dto::*;
pub use ledger_service::LedgerService;
