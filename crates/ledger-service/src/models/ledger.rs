//! 账本实体
//!
//! 用户、订单、余额与提现记录。金额统一使用 `Decimal`，对应数据库 NUMERIC。

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::enums::OrderStatus;

/// 用户
///
/// 密码摘要与盐由认证协作方生成，这里只保存用于登录比对
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub login: String,
    pub password_hash: String,
    pub salt: String,
}

/// 订单
///
/// `number` 为全局唯一的自然键，跨用户唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub number: String,
    pub owner: Uuid,
    pub status: OrderStatus,
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    pub fn new(number: impl Into<String>, owner: Uuid) -> Self {
        Self {
            number: number.into(),
            owner,
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        }
    }
}

/// 用户余额
///
/// `current` 永不为负，`withdrawn` 只增不减
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Balance {
    pub current: Decimal,
    pub withdrawn: Decimal,
}

/// 提现记录（只追加）
///
/// 提现使用的订单号只需通过 Luhn 校验，不要求存在于订单表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    pub owner: Uuid,
    pub order_number: String,
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

/// 对账结果落库后的效果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// 状态前进，未入账
    Updated,
    /// 状态前进到 PROCESSED 并完成入账
    Credited,
    /// 结果未推进状态（重复投递或回退），未做任何修改
    Unchanged,
}
