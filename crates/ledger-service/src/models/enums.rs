//! 账本枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 订单状态
///
/// 离开 NEW 之后单调前进，不允许回退：
/// NEW -> REGISTERED | PROCESSING | INVALID | PROCESSED
/// REGISTERED -> PROCESSING | PROCESSED | INVALID
/// PROCESSING -> PROCESSED | INVALID
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 已提交，尚未向 accrual 查询
    #[default]
    New,
    /// accrual 已登记，尚未开始计算
    Registered,
    /// accrual 计算中
    Processing,
    /// 终态：无积分
    Invalid,
    /// 终态：已计算积分
    Processed,
}

impl OrderStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::Processed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Registered => 1,
            Self::Processing => 2,
            Self::Invalid | Self::Processed => 3,
        }
    }

    /// 是否允许从当前状态迁移到 `next`
    ///
    /// 相同状态不算迁移；终态不再接受任何迁移
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Registered => "REGISTERED",
            Self::Processing => "PROCESSING",
            Self::Invalid => "INVALID",
            Self::Processed => "PROCESSED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
