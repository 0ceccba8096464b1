//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "reconciliation_attempts_total",
        "Reconciliation ticks grouped by outcome"
    );
    metrics::describe_histogram!(
        "accrual_request_duration_seconds",
        "Accrual oracle request duration in seconds"
    );
    metrics::describe_counter!(
        "accrual_rate_limited_total",
        "Number of 429 responses from the accrual oracle"
    );
    metrics::describe_counter!(
        "accrual_credits_total",
        "Number of balance credits from processed orders"
    );
    metrics::describe_histogram!("accrual_credit_points", "Points credited per processed order");
    metrics::describe_counter!("withdrawals_total", "Withdrawal attempts grouped by status");
    metrics::describe_counter!("orders_submitted_total", "Order submissions grouped by outcome");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 记录一次对账循环的结果
#[inline]
pub fn record_reconciliation(outcome: &str) {
    metrics::counter!("reconciliation_attempts_total", "outcome" => outcome.to_string())
        .increment(1);
}

/// 记录一次 accrual 查询
#[inline]
pub fn record_accrual_request(status: &str, duration_secs: f64) {
    metrics::histogram!("accrual_request_duration_seconds", "status" => status.to_string())
        .record(duration_secs);
}

/// 记录 accrual 限流
#[inline]
pub fn record_accrual_rate_limited() {
    metrics::counter!("accrual_rate_limited_total").increment(1);
}

/// 记录入账积分
#[inline]
pub fn record_accrual_credit(points: f64) {
    metrics::counter!("accrual_credits_total").increment(1);
    metrics::histogram!("accrual_credit_points").record(points);
}

/// 记录提现
#[inline]
pub fn record_withdrawal(status: &str) {
    metrics::counter!("withdrawals_total", "status" => status.to_string()).increment(1);
}

/// 记录订单提交
#[inline]
pub fn record_order_submission(outcome: &str) {
    metrics::counter!("orders_submitted_total", "outcome" => outcome.to_string()).increment(1);
}
