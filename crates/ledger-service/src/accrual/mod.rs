//! accrual 积分计算服务客户端
//!
//! 外部服务决定每个订单值多少积分。客户端只做一次请求并把结果分类，
//! 不做任何重试；重试与限流退避由对账循环统一负责。

mod client;
mod dto;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use client::HttpAccrualClient;
pub use dto::{AccrualOutcome, AccrualResponse, AccrualStatus};

/// accrual 调用错误
#[derive(Debug, Error)]
pub enum AccrualError {
    #[error("accrual 服务不可用: {0}")]
    Unavailable(String),

    /// 204：accrual 尚未登记该订单，下次再查
    #[error("accrual 尚未登记订单: {0}")]
    NotRegistered(String),

    #[error("accrual 限流，{}s 后重试", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("accrual 响应格式错误: {0}")]
    MalformedResponse(String),
}

impl AccrualError {
    /// 用于日志与指标的短标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::NotRegistered(_) => "not_registered",
            Self::RateLimited { .. } => "rate_limited",
            Self::MalformedResponse(_) => "malformed",
        }
    }
}

/// accrual 查询接口
///
/// 对账循环依赖该抽象，测试中可注入 mock 或假实现
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccrualOracle: Send + Sync {
    async fn fetch(&self, number: &str) -> Result<AccrualOutcome, AccrualError>;
}
