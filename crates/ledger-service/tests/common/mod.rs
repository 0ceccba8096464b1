//! 两种存储实现共用的断言

use loyalty_ledger::{ApplyOutcome, LedgerError, LedgerStore, OrderStatus};
use rust_decimal::Decimal;
use uuid::Uuid;

/// 超出两位小数的金额必须被拒绝，且不改变任何状态
///
/// `user` 需为零余额新用户，`credit_order` 为未提交过的订单号
pub async fn assert_sub_cent_amounts_rejected(
    store: &dyn LedgerStore,
    user: Uuid,
    credit_order: &str,
    withdrawal_order: &str,
) {
    store.submit_order(credit_order, user).await.unwrap();

    let err = store
        .apply_reconciliation_result(
            credit_order,
            OrderStatus::Processed,
            Some(Decimal::new(1, 3)),
            user,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)), "{err:?}");
    assert_eq!(store.get_balance(user).await.unwrap().current, Decimal::ZERO);

    let outcome = store
        .apply_reconciliation_result(
            credit_order,
            OrderStatus::Processed,
            Some(Decimal::new(1, 2)),
            user,
        )
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Credited);

    let err = store
        .withdraw(user, withdrawal_order, Decimal::new(5, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)), "{err:?}");

    let balance = store.get_balance(user).await.unwrap();
    assert_eq!(balance.current, Decimal::new(1, 2));
    assert_eq!(balance.withdrawn, Decimal::ZERO);
    assert!(matches!(
        store.list_withdrawals(user).await,
        Err(LedgerError::NoWithdrawals)
    ));

    // 0.010 与 0.01 等值，可以提现
    store
        .withdraw(user, withdrawal_order, Decimal::new(10, 3))
        .await
        .unwrap();
    let balance = store.get_balance(user).await.unwrap();
    assert_eq!(balance.current, Decimal::ZERO);
    assert_eq!(balance.withdrawn, Decimal::new(1, 2));
}
