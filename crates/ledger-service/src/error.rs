//! 账本服务错误类型
//!
//! 定义服务层的业务错误和系统错误

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// 账本服务错误类型
#[derive(Debug, Error)]
pub enum LedgerError {
    // === 校验错误 ===
    #[error("无效的订单号: {0}")]
    InvalidOrderNumber(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 用户相关错误 ===
    #[error("登录名已被占用: {0}")]
    LoginAlreadyTaken(String),

    #[error("用户不存在: {0}")]
    UserNotFound(String),

    #[error("登录名或密码错误")]
    InvalidCredentials,

    // === 订单相关错误 ===
    #[error("订单已由当前用户提交: {0}")]
    OrderAlreadyAdded(String),

    #[error("订单已被其他用户提交: {0}")]
    OrderOwnedByAnotherUser(String),

    #[error("订单不存在: {0}")]
    OrderNotFound(String),

    #[error("暂无订单")]
    NoOrders,

    // === 余额相关错误 ===
    #[error("余额不足: 需要 {requested}, 可用 {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("余额记录不存在: user_id={0}")]
    BalanceNotFound(Uuid),

    #[error("暂无提现记录")]
    NoWithdrawals,

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 账本服务 Result 类型别名
pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// 检查是否为业务错误（非系统错误）
    ///
    /// 业务错误需要以明确的结果返回给调用方，系统错误统一视为内部故障
    pub fn is_business_error(&self) -> bool {
        !matches!(self, Self::Database(_) | Self::Internal(_))
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidOrderNumber(_) => "INVALID_ORDER_NUMBER",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::LoginAlreadyTaken(_) => "LOGIN_ALREADY_TAKEN",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::OrderAlreadyAdded(_) => "ORDER_ALREADY_ADDED",
            Self::OrderOwnedByAnotherUser(_) => "ORDER_OWNED_BY_ANOTHER_USER",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::NoOrders => "NO_ORDERS",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::BalanceNotFound(_) => "BALANCE_NOT_FOUND",
            Self::NoWithdrawals => "NO_WITHDRAWALS",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_business_error() {
        assert!(LedgerError::NoOrders.is_business_error());
        assert!(LedgerError::OrderOwnedByAnotherUser("79927398713".to_string()).is_business_error());
        assert!(
            LedgerError::InsufficientBalance {
                requested: Decimal::from(10),
                available: Decimal::from(3),
            }
            .is_business_error()
        );
        assert!(!LedgerError::Internal("boom".to_string()).is_business_error());
        assert!(!LedgerError::Database(sqlx::Error::PoolTimedOut).is_business_error());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(LedgerError::NoWithdrawals.error_code(), "NO_WITHDRAWALS");
        assert_eq!(
            LedgerError::LoginAlreadyTaken("alice".to_string()).error_code(),
            "LOGIN_ALREADY_TAKEN"
        );
        assert_eq!(
            LedgerError::InvalidOrderNumber("abc".to_string()).error_code(),
            "INVALID_ORDER_NUMBER"
        );
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::InsufficientBalance {
            requested: Decimal::new(75050, 2),
            available: Decimal::from(300),
        };
        assert!(err.to_string().contains("750.50"));
        assert!(err.to_string().contains("300"));
    }
}
