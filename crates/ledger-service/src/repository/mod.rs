//! 账本仓储层
//!
//! 提供用户、订单、余额与提现记录的数据访问接口。
//!
//! ## 设计原则
//!
//! - 每个 trait 方法是一个完整事务，调用方无需管理事务边界
//! - 使用 SQLx 进行类型安全的数据库操作
//! - 内存实现与 PostgreSQL 实现语义一致，供测试替换

mod memory_store;
mod pg_store;
mod traits;

pub use memory_store::InMemoryLedgerStore;
pub use pg_store::LedgerRepository;
pub use traits::*;
