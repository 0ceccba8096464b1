//! accrual HTTP 客户端

use std::time::{Duration, Instant};

use async_trait::async_trait;
use loyalty_shared::config::AccrualConfig;
use loyalty_shared::observability::metrics;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::{debug, warn};

use super::dto::{AccrualOutcome, AccrualResponse};
use super::{AccrualError, AccrualOracle};

/// 基于 reqwest 的 accrual 客户端
///
/// `reqwest::Client` 内部带连接池，进程内共享一个实例即可
pub struct HttpAccrualClient {
    client: reqwest::Client,
    base_url: String,
    default_retry_after: Duration,
}

impl HttpAccrualClient {
    pub fn new(config: &AccrualConfig) -> Result<Self, AccrualError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AccrualError::Unavailable(format!("创建 HTTP 客户端失败: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
        })
    }

    fn order_url(&self, number: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }
}

/// 解析 Retry-After（秒数形式），缺失或无法解析时返回 None
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl AccrualOracle for HttpAccrualClient {
    async fn fetch(&self, number: &str) -> Result<AccrualOutcome, AccrualError> {
        let start = Instant::now();
        let result = self.request(number).await;

        let label = match &result {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        metrics::record_accrual_request(label, start.elapsed().as_secs_f64());
        result
    }
}

impl HttpAccrualClient {
    async fn request(&self, number: &str) -> Result<AccrualOutcome, AccrualError> {
        let response = self
            .client
            .get(self.order_url(number))
            .send()
            .await
            .map_err(|e| AccrualError::Unavailable(format!("请求失败: {e}")))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| AccrualError::Unavailable(format!("读取响应失败: {e}")))?;
                let parsed: AccrualResponse = serde_json::from_slice(&body)
                    .map_err(|e| AccrualError::MalformedResponse(e.to_string()))?;

                debug!(order = %number, status = ?parsed.status, "accrual 查询成功");
                parsed.into_outcome(number)
            }
            StatusCode::NO_CONTENT => Err(AccrualError::NotRegistered(number.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = parse_retry_after(response.headers()).unwrap_or_else(|| {
                    warn!(order = %number, "429 响应缺少有效的 Retry-After，使用默认冷却时间");
                    self.default_retry_after
                });
                Err(AccrualError::RateLimited { retry_after })
            }
            status => Err(AccrualError::Unavailable(format!("HTTP {status}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_retry_after_missing_or_invalid() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_order_url_trims_trailing_slash() {
        let client = HttpAccrualClient::new(&AccrualConfig {
            base_url: "http://accrual:8080/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.order_url("12345678903"),
            "http://accrual:8080/api/orders/12345678903"
        );
    }
}
