//! 服务层数据传输对象
//!
//! 供请求层直接序列化输出，与内部领域模型解耦。
//! 金额以 JSON 数字输出，时间为 RFC 3339，订单号始终为字符串。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Balance, Order, OrderStatus, Withdrawal};

/// 提交订单的结果
///
/// 同一用户重复提交不是错误，以 `AlreadyAdded` 告知调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOrderOutcome {
    /// 新订单已受理，等待对账
    Accepted,
    /// 当前用户此前已提交过该订单
    AlreadyAdded,
}

/// 订单视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub number: String,
    pub status: OrderStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub accrual: Option<Decimal>,
    /// RFC 3339
    pub uploaded_at: String,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            number: order.number,
            status: order.status,
            accrual: order.accrual,
            uploaded_at: order.uploaded_at.to_rfc3339(),
        }
    }
}

/// 余额视图
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceView {
    #[serde(with = "rust_decimal::serde::float")]
    pub current: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub withdrawn: Decimal,
}

impl From<Balance> for BalanceView {
    fn from(balance: Balance) -> Self {
        Self {
            current: balance.current,
            withdrawn: balance.withdrawn,
        }
    }
}

/// 提现记录视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalView {
    pub order: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
    /// RFC 3339
    pub processed_at: String,
}

impl From<Withdrawal> for WithdrawalView {
    fn from(withdrawal: Withdrawal) -> Self {
        Self {
            order: withdrawal.order_number,
            sum: withdrawal.sum,
            processed_at: withdrawal.processed_at.to_rfc3339(),
        }
    }
}
