//! accrual 响应结构与校验

use rust_decimal::Decimal;
use serde::Deserialize;

use super::AccrualError;
use crate::models::OrderStatus;
use crate::validation::AMOUNT_SCALE;

/// accrual 侧的订单状态
///
/// 不包含 NEW：订单只有登记到 accrual 后才会出现在响应里
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    Registered,
    Invalid,
    Processing,
    Processed,
}

impl From<AccrualStatus> for OrderStatus {
    fn from(status: AccrualStatus) -> Self {
        match status {
            AccrualStatus::Registered => OrderStatus::Registered,
            AccrualStatus::Invalid => OrderStatus::Invalid,
            AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Processed => OrderStatus::Processed,
        }
    }
}

/// accrual 200 响应体
#[derive(Debug, Clone, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default)]
    pub accrual: Option<Decimal>,
}

/// 校验后的查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualOutcome {
    pub order: String,
    pub status: OrderStatus,
    /// 仅在 PROCESSED 时存在，非负且已舍入到两位小数
    pub accrual: Option<Decimal>,
}

impl AccrualResponse {
    /// 校验响应与请求是否一致，并转换为领域结果
    pub fn into_outcome(self, requested: &str) -> Result<AccrualOutcome, AccrualError> {
        if self.order != requested {
            return Err(AccrualError::MalformedResponse(format!(
                "订单号不一致: 请求 {requested}, 响应 {}",
                self.order
            )));
        }

        match (self.status, self.accrual) {
            (_, Some(points)) if points < Decimal::ZERO => Err(AccrualError::MalformedResponse(
                format!("积分为负: {points}"),
            )),
            (AccrualStatus::Processed, _) | (_, None) => Ok(AccrualOutcome {
                order: self.order,
                status: self.status.into(),
                accrual: self.accrual.map(|points| points.round_dp(AMOUNT_SCALE)),
            }),
            (status, Some(_)) => Err(AccrualError::MalformedResponse(format!(
                "状态 {status:?} 不应携带积分"
            ))),
        }
    }
}
