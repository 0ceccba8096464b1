//! 积分账本服务入口
//!
//! 连接数据库并启动对账 Worker，收到关闭信号后通知 Worker 退出。

use std::sync::Arc;

use anyhow::Result;
use loyalty_shared::{config::AppConfig, database::Database, observability};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use loyalty_ledger::{
    accrual::HttpAccrualClient, reconciliation::ReconciliationWorker,
    repository::LedgerRepository,
};

const SERVICE_NAME: &str = "loyalty-ledger";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置
    let (config, load_error) = AppConfig::load_with_fallback(SERVICE_NAME);

    // 2. 初始化可观测性
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    if let Some(e) = load_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }

    info!("Starting {SERVICE_NAME}...");
    info!(
        environment = %config.environment,
        accrual = %config.accrual.base_url,
        "Configuration loaded"
    );

    // 3. 初始化数据库连接
    let db = Database::connect(&config.database).await?;
    let latency = db.health_check().await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }
    info!(?latency, "Database connection established");

    // 4. 创建存储与 accrual 客户端
    let store = Arc::new(LedgerRepository::new(db.pool().clone()));
    let oracle = Arc::new(HttpAccrualClient::new(&config.accrual)?);

    // 5. 启动对账 Worker
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ReconciliationWorker::new(
        store,
        oracle,
        &config.reconciliation,
        config.accrual.request_timeout(),
    );
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));
    info!("Reconciliation worker started");

    // 6. 等待关闭信号
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    if let Err(e) = worker_handle.await {
        error!(error = %e, "Reconciliation worker terminated abnormally");
    }

    db.close().await;
    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
