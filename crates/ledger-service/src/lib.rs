//! 积分账本服务
//!
//! 用户提交购物订单号，外部 accrual 服务异步计算每个订单的积分，
//! 结果累加到用户余额，余额可部分用于抵扣新订单（提现）。
//!
//! ## 核心功能
//!
//! - **订单号校验**：Luhn 校验，按数字串处理，保留前导零
//! - **账本存储**：订单归属唯一、余额非负、每个订单只入账一次
//! - **accrual 客户端**：单次查询，限流时返回冷却时长
//! - **对账循环**：后台逐个推进 NEW 订单，限流时全局退避
//! - **账本服务**：供请求层调用的注册、登录、订单、余额、提现接口
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `validation`: 订单号与金额校验
//! - `repository`: 账本存储（PostgreSQL 与内存实现）
//! - `accrual`: accrual 服务客户端
//! - `reconciliation`: 对账 Worker
//! - `auth`: 密码摘要
//! - `service`: 业务服务层

pub mod accrual;
pub mod auth;
pub mod error;
pub mod models;
pub mod reconciliation;
pub mod repository;
pub mod service;
pub mod validation;

pub use accrual::{AccrualError, AccrualOracle, AccrualOutcome, HttpAccrualClient};
pub use auth::{PasswordHasher, Sha512PasswordHasher};
pub use error::{LedgerError, Result};
pub use models::*;
pub use reconciliation::{ReconciliationWorker, TickOutcome, WorkerState};
pub use repository::{InMemoryLedgerStore, LedgerRepository, LedgerStore};
pub use service::{BalanceView, LedgerService, OrderView, SubmitOrderOutcome, WithdrawalView};
pub use validation::is_valid_order_number;
