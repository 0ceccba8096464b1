//! PostgreSQL 账本仓储
//!
//! 所有跨表写入都在单个事务内完成；余额与订单的读改写使用
//! `FOR UPDATE` 行锁串行化，防止并发提现或重复入账。

use async_trait::async_trait;
use chrono::Utc;
use loyalty_shared::config::ReconciliationOrder;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::traits::LedgerStore;
use crate::error::{LedgerError, Result};
use crate::models::{ApplyOutcome, Balance, Order, OrderStatus, User, Withdrawal};
use crate::validation::{validate_accrual, validate_withdrawal_sum};

const NEXT_NEW_ORDER_NEWEST_FIRST: &str = r#"
    SELECT number, user_id AS owner, status, accrual, uploaded_at
    FROM orders
    WHERE status = $1 AND NOT (number = ANY($2))
    ORDER BY uploaded_at DESC
    LIMIT 1
"#;

const NEXT_NEW_ORDER_OLDEST_FIRST: &str = r#"
    SELECT number, user_id AS owner, status, accrual, uploaded_at
    FROM orders
    WHERE status = $1 AND NOT (number = ANY($2))
    ORDER BY uploaded_at ASC
    LIMIT 1
"#;

/// 账本仓储（PostgreSQL 实现）
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    /// 用户与零余额在同一事务内创建
    ///
    /// 登录名唯一性依赖 users_login_key 唯一约束，不做预查询
    #[instrument(skip(self, password_hash, salt))]
    async fn register(&self, login: &str, password_hash: &str, salt: &str) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;
        let user_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO users (user_id, login, hash, salt)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(login)
        .bind(password_hash)
        .bind(salt)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                LedgerError::LoginAlreadyTaken(login.to_string())
            }
            _ => LedgerError::Database(e),
        })?;

        sqlx::query(
            r#"
            INSERT INTO balances (user_id, balance, withdrawn)
            VALUES ($1, 0, 0)
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(user_id = %user_id, "用户注册成功");
        Ok(user_id)
    }

    #[instrument(skip(self))]
    async fn find_user(&self, login: &str) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, login, hash AS password_hash, salt
            FROM users
            WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::UserNotFound(login.to_string()))
    }

    /// 插入与归属判定在同一事务内完成
    ///
    /// `ON CONFLICT DO NOTHING` 会等待并发插入同一订单号的事务结束，
    /// 因此两个几乎同时的提交只会有一个成功
    #[instrument(skip(self), fields(owner = %owner))]
    async fn submit_order(&self, number: &str, owner: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (number, user_id, status, uploaded_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (number) DO NOTHING
            "#,
        )
        .bind(number)
        .bind(owner)
        .bind(OrderStatus::New)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let existing_owner: Uuid =
                sqlx::query("SELECT user_id FROM orders WHERE number = $1")
                    .bind(number)
                    .fetch_one(&mut *tx)
                    .await?
                    .get("user_id");

            return Err(if existing_owner == owner {
                LedgerError::OrderAlreadyAdded(number.to_string())
            } else {
                LedgerError::OrderOwnedByAnotherUser(number.to_string())
            });
        }

        tx.commit().await?;
        debug!(order = %number, "订单已登记");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_orders(&self, owner: Uuid) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT number, user_id AS owner, status, accrual, uploaded_at
            FROM orders
            WHERE user_id = $1
            ORDER BY uploaded_at ASC, number ASC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        if orders.is_empty() {
            return Err(LedgerError::NoOrders);
        }
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn get_balance(&self, owner: Uuid) -> Result<Balance> {
        sqlx::query_as::<_, Balance>(
            r#"
            SELECT balance AS current, withdrawn
            FROM balances
            WHERE user_id = $1
            "#,
        )
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::BalanceNotFound(owner))
    }

    /// 锁定余额行后校验并扣减
    ///
    /// 同一用户的并发提现在 FOR UPDATE 上排队，后到者读到的是已扣减后的余额
    #[instrument(skip(self), fields(owner = %owner, sum = %sum))]
    async fn withdraw(&self, owner: Uuid, number: &str, sum: Decimal) -> Result<()> {
        // NUMERIC(18, 2) 会静默舍入多余的小数位，必须在写入前拒绝
        validate_withdrawal_sum(sum)?;

        let mut tx = self.pool.begin().await?;

        let current: Decimal = sqlx::query(
            r#"
            SELECT balance
            FROM balances
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::BalanceNotFound(owner))?
        .get("balance");

        if current - sum < Decimal::ZERO {
            return Err(LedgerError::InsufficientBalance {
                requested: sum,
                available: current,
            });
        }

        sqlx::query(
            r#"
            UPDATE balances
            SET balance = balance - $1, withdrawn = withdrawn + $1
            WHERE user_id = $2
            "#,
        )
        .bind(sum)
        .bind(owner)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO withdrawals (user_id, order_number, sum, processed_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(owner)
        .bind(number)
        .bind(sum)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(order = %number, "提现成功");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_withdrawals(&self, owner: Uuid) -> Result<Vec<Withdrawal>> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT user_id AS owner, order_number, sum, processed_at
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY processed_at ASC, id ASC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        if withdrawals.is_empty() {
            return Err(LedgerError::NoWithdrawals);
        }
        Ok(withdrawals)
    }

    async fn next_order_for_reconciliation(
        &self,
        selection: ReconciliationOrder,
        skipped: &[String],
    ) -> Result<Option<Order>> {
        let sql = match selection {
            ReconciliationOrder::NewestFirst => NEXT_NEW_ORDER_NEWEST_FIRST,
            ReconciliationOrder::OldestFirst => NEXT_NEW_ORDER_OLDEST_FIRST,
        };

        let order = sqlx::query_as::<_, Order>(sql)
            .bind(OrderStatus::New)
            .bind(skipped)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// 锁定订单行，只在状态真正前进时写入
    ///
    /// 迁移到 PROCESSED 时在同一事务内入账；已是终态的订单再次收到相同结果
    /// 会返回 `Unchanged`，不会重复入账
    #[instrument(skip(self), fields(owner = %owner))]
    async fn apply_reconciliation_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
        owner: Uuid,
    ) -> Result<ApplyOutcome> {
        validate_accrual(number, accrual)?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT user_id, status
            FROM orders
            WHERE number = $1
            FOR UPDATE
            "#,
        )
        .bind(number)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LedgerError::OrderNotFound(number.to_string()))?;

        let current: OrderStatus = row.get("status");
        let row_owner: Uuid = row.get("user_id");

        if !current.can_transition_to(status) {
            debug!(order = %number, %current, next = %status, "状态未前进，跳过");
            return Ok(ApplyOutcome::Unchanged);
        }

        if row_owner != owner {
            warn!(
                order = %number,
                expected = %owner,
                actual = %row_owner,
                "订单归属与调用方不一致，以订单记录为准"
            );
        }

        let accrual = accrual.filter(|_| status == OrderStatus::Processed);

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, accrual = $2
            WHERE number = $3
            "#,
        )
        .bind(status)
        .bind(accrual)
        .bind(number)
        .execute(&mut *tx)
        .await?;

        let outcome = match accrual {
            Some(points) => {
                let credited = sqlx::query(
                    r#"
                    UPDATE balances
                    SET balance = balance + $1
                    WHERE user_id = $2
                    "#,
                )
                .bind(points)
                .bind(row_owner)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if credited == 0 {
                    return Err(LedgerError::BalanceNotFound(row_owner));
                }
                ApplyOutcome::Credited
            }
            None => ApplyOutcome::Updated,
        };

        tx.commit().await?;

        info!(order = %number, from = %current, to = %status, ?accrual, "订单状态已更新");
        Ok(outcome)
    }
}
