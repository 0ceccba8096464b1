//! 账本服务
//!
//! 请求层调用的无状态协调层：
//! - 注册与登录（摘要计算委托给密码协作方）
//! - 订单提交前做 Luhn 校验，同一用户的重复提交转换为良性结果
//! - 余额、订单与提现查询直接透传到存储
//! - 提现前校验订单号与金额

use std::sync::Arc;

use loyalty_shared::observability::metrics;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::PasswordHasher;
use crate::error::{LedgerError, Result};
use crate::repository::LedgerStore;
use crate::service::dto::{BalanceView, OrderView, SubmitOrderOutcome, WithdrawalView};
use crate::validation::{is_valid_order_number, validate_withdrawal_sum};

/// 账本服务
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    /// 注册用户，返回新用户 ID
    #[instrument(skip(self, password))]
    pub async fn register_user(&self, login: &str, password: &str) -> Result<Uuid> {
        validate_credentials(login, password)?;

        let salt = self.hasher.generate_salt();
        let hash = self.hasher.hash(password, &salt);
        self.store.register(login, &hash, &salt).await
    }

    /// 校验登录名与密码
    ///
    /// 用户不存在与密码错误统一返回 `InvalidCredentials`
    #[instrument(skip(self, password))]
    pub async fn authenticate_user(&self, login: &str, password: &str) -> Result<Uuid> {
        validate_credentials(login, password)?;

        let user = match self.store.find_user(login).await {
            Ok(user) => user,
            Err(LedgerError::UserNotFound(_)) => return Err(LedgerError::InvalidCredentials),
            Err(e) => return Err(e),
        };

        if !self.hasher.verify(password, &user.salt, &user.password_hash) {
            warn!(login, "密码校验失败");
            return Err(LedgerError::InvalidCredentials);
        }
        Ok(user.user_id)
    }

    /// 提交订单
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn submit_order(&self, user_id: Uuid, number: &str) -> Result<SubmitOrderOutcome> {
        if !is_valid_order_number(number) {
            metrics::record_order_submission("invalid");
            return Err(LedgerError::InvalidOrderNumber(number.to_string()));
        }

        let outcome = match self.store.submit_order(number, user_id).await {
            Ok(()) => {
                info!(order = %number, "订单已受理");
                SubmitOrderOutcome::Accepted
            }
            Err(LedgerError::OrderAlreadyAdded(_)) => SubmitOrderOutcome::AlreadyAdded,
            Err(e) => {
                if matches!(e, LedgerError::OrderOwnedByAnotherUser(_)) {
                    metrics::record_order_submission("conflict");
                }
                return Err(e);
            }
        };

        metrics::record_order_submission(match outcome {
            SubmitOrderOutcome::Accepted => "accepted",
            SubmitOrderOutcome::AlreadyAdded => "already_added",
        });
        Ok(outcome)
    }

    /// 按上传时间升序返回用户订单；没有订单时返回 `NoOrders`
    #[instrument(skip(self))]
    pub async fn get_orders(&self, user_id: Uuid) -> Result<Vec<OrderView>> {
        let orders = self.store.list_orders(user_id).await?;
        Ok(orders.into_iter().map(OrderView::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn get_balance(&self, user_id: Uuid) -> Result<BalanceView> {
        self.store.get_balance(user_id).await.map(BalanceView::from)
    }

    /// 用积分抵扣订单
    ///
    /// 订单号只需通过 Luhn 校验，不要求是用户提交过的订单
    #[instrument(skip(self), fields(user_id = %user_id, sum = %sum))]
    pub async fn withdraw(&self, user_id: Uuid, number: &str, sum: Decimal) -> Result<()> {
        if !is_valid_order_number(number) {
            return Err(LedgerError::InvalidOrderNumber(number.to_string()));
        }
        validate_withdrawal_sum(sum)?;

        let result = self.store.withdraw(user_id, number, sum).await;
        metrics::record_withdrawal(match &result {
            Ok(()) => "success",
            Err(LedgerError::InsufficientBalance { .. }) => "insufficient_balance",
            Err(_) => "error",
        });
        result
    }

    /// 按处理时间升序返回提现记录；没有记录时返回 `NoWithdrawals`
    #[instrument(skip(self))]
    pub async fn get_withdrawals(&self, user_id: Uuid) -> Result<Vec<WithdrawalView>> {
        let withdrawals = self.store.list_withdrawals(user_id).await?;
        Ok(withdrawals.into_iter().map(WithdrawalView::from).collect())
    }
}

fn validate_credentials(login: &str, password: &str) -> Result<()> {
    if login.trim().is_empty() {
        return Err(LedgerError::Validation("登录名不能为空".to_string()));
    }
    if password.is_empty() {
        return Err(LedgerError::Validation("密码不能为空".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Sha512PasswordHasher;
    use crate::models::User;
    use crate::repository::MockLedgerStore;
    use mockall::predicate::eq;

    fn service(store: MockLedgerStore) -> LedgerService {
        LedgerService::new(Arc::new(store), Arc::new(Sha512PasswordHasher))
    }

    #[tokio::test]
    async fn test_submit_invalid_number_never_reaches_store() {
        let mut store = MockLedgerStore::new();
        store.expect_submit_order().never();

        let err = service(store)
            .submit_order(Uuid::new_v4(), "12345678900")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidOrderNumber(_)));
    }

    #[tokio::test]
    async fn test_submit_duplicate_by_same_owner_is_benign() {
        let mut store = MockLedgerStore::new();
        store
            .expect_submit_order()
            .returning(|n, _| Err(LedgerError::OrderAlreadyAdded(n.to_string())));

        let outcome = service(store)
            .submit_order(Uuid::new_v4(), "12345678903")
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOrderOutcome::AlreadyAdded);
    }

    #[tokio::test]
    async fn test_submit_conflict_is_error() {
        let mut store = MockLedgerStore::new();
        store
            .expect_submit_order()
            .returning(|n, _| Err(LedgerError::OrderOwnedByAnotherUser(n.to_string())));

        let err = service(store)
            .submit_order(Uuid::new_v4(), "12345678903")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::OrderOwnedByAnotherUser(_)));
    }

    #[tokio::test]
    async fn test_withdraw_validates_before_store() {
        let mut store = MockLedgerStore::new();
        store.expect_withdraw().never();
        let service = service(store);
        let user = Uuid::new_v4();

        assert!(matches!(
            service.withdraw(user, "123", Decimal::from(10)).await,
            Err(LedgerError::InvalidOrderNumber(_))
        ));
        assert!(matches!(
            service.withdraw(user, "2377225624", Decimal::ZERO).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            service.withdraw(user, "2377225624", Decimal::from(-5)).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            service.withdraw(user, "2377225624", Decimal::new(5, 3)).await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_withdraw_accepts_trailing_zero_scale() {
        let mut store = MockLedgerStore::new();
        store
            .expect_withdraw()
            .withf(|_, _, sum| *sum == Decimal::new(1, 2))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let result = service(store)
            .withdraw(Uuid::new_v4(), "2377225624", Decimal::new(10, 3))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_register_stores_salted_hash() {
        let mut store = MockLedgerStore::new();
        store
            .expect_register()
            .withf(|login, hash, salt| {
                login == "alice"
                    && !salt.is_empty()
                    && hash == Sha512PasswordHasher.hash("secret", salt)
            })
            .times(1)
            .returning(|_, _, _| Ok(Uuid::nil()));

        let id = service(store).register_user("alice", "secret").await.unwrap();
        assert_eq!(id, Uuid::nil());
    }

    #[tokio::test]
    async fn test_register_rejects_empty_credentials() {
        let mut store = MockLedgerStore::new();
        store.expect_register().never();
        let service = service(store);

        assert!(matches!(
            service.register_user("", "secret").await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            service.register_user("alice", "").await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let hasher = Sha512PasswordHasher;
        let salt = hasher.generate_salt();
        let user = User {
            user_id: Uuid::new_v4(),
            login: "alice".to_string(),
            password_hash: hasher.hash("secret", &salt),
            salt,
        };
        let expected_id = user.user_id;

        let mut store = MockLedgerStore::new();
        store
            .expect_find_user()
            .with(eq("alice"))
            .returning(move |_| Ok(user.clone()));
        store
            .expect_find_user()
            .with(eq("bob"))
            .returning(|l| Err(LedgerError::UserNotFound(l.to_string())));
        let service = service(store);

        assert_eq!(
            service.authenticate_user("alice", "secret").await.unwrap(),
            expected_id
        );
        assert!(matches!(
            service.authenticate_user("alice", "wrong").await,
            Err(LedgerError::InvalidCredentials)
        ));
        assert!(matches!(
            service.authenticate_user("bob", "secret").await,
            Err(LedgerError::InvalidCredentials)
        ));
    }
}
