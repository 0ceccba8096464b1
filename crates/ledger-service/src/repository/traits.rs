//! 仓储 Trait 定义
//!
//! 服务层与对账循环依赖该抽象而非具体实现，
//! PostgreSQL 实现用于生产，内存实现用于测试。

use async_trait::async_trait;
use loyalty_shared::config::ReconciliationOrder;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ApplyOutcome, Balance, Order, OrderStatus, User, Withdrawal};

/// 账本存储接口
///
/// 每个方法都是一个独立的原子操作：要么全部生效，要么全部不生效。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // 用户
    /// 创建用户并初始化零余额；登录名唯一性由存储保证
    async fn register(&self, login: &str, password_hash: &str, salt: &str) -> Result<Uuid>;
    async fn find_user(&self, login: &str) -> Result<User>;

    // 订单
    /// 提交订单（状态 NEW）
    ///
    /// 已由同一用户提交返回 `OrderAlreadyAdded`，已被他人提交返回 `OrderOwnedByAnotherUser`
    async fn submit_order(&self, number: &str, owner: Uuid) -> Result<()>;
    /// 按上传时间升序返回；没有订单时返回 `NoOrders`
    async fn list_orders(&self, owner: Uuid) -> Result<Vec<Order>>;

    // 余额与提现
    async fn get_balance(&self, owner: Uuid) -> Result<Balance>;
    /// 扣减余额并追加提现记录；余额不足返回 `InsufficientBalance`
    async fn withdraw(&self, owner: Uuid, number: &str, sum: Decimal) -> Result<()>;
    /// 按处理时间升序返回；没有记录时返回 `NoWithdrawals`
    async fn list_withdrawals(&self, owner: Uuid) -> Result<Vec<Withdrawal>>;

    // 对账
    /// 取出至多一个 NEW 状态的订单，跳过 `skipped` 中的订单号
    async fn next_order_for_reconciliation(
        &self,
        selection: ReconciliationOrder,
        skipped: &[String],
    ) -> Result<Option<Order>>;
    /// 更新订单状态，迁移到 PROCESSED 时在同一事务内给余额入账
    async fn apply_reconciliation_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
        owner: Uuid,
    ) -> Result<ApplyOutcome>;
}
