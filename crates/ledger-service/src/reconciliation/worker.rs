//! 订单对账 Worker
//!
//! 单个常驻后台任务，按固定间隔取出一个 NEW 订单，向 accrual 查询结果并落库。
//! 任何单次失败只记录日志，下个 tick 继续；失败的订单在 `retry_delay` 内不再被挑选，
//! 其余订单照常轮询。收到 429 时进入全局冷却，冷却期间不发起任何查询。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use loyalty_shared::config::{ReconciliationConfig, ReconciliationOrder};
use loyalty_shared::observability::metrics;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::accrual::{AccrualError, AccrualOracle};
use crate::models::{ApplyOutcome, OrderStatus};
use crate::repository::LedgerStore;

/// Worker 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// 等待下一个 tick
    Idle,
    /// 被 accrual 限流，`until` 之前不再查询
    Backoff { until: Instant },
}

/// 单个 tick 的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// 没有待对账的订单
    NoPendingOrder,
    /// 仍在冷却期内，本次跳过
    CoolingDown { remaining: Duration },
    /// 查询成功并已落库
    Applied {
        number: String,
        status: OrderStatus,
        outcome: ApplyOutcome,
    },
    /// accrual 尚未登记订单，保持 NEW 等待下次
    NotRegistered { number: String },
    /// 被限流，进入冷却
    RateLimited { retry_after: Duration },
    /// 本次失败，订单暂缓后重试
    Failed { reason: String },
}

impl TickOutcome {
    /// 计入 `reconciliation_attempts_total` 的标签；冷却中跳过的 tick 不计数
    fn metric_label(&self) -> Option<&'static str> {
        match self {
            Self::NoPendingOrder => Some("idle"),
            Self::CoolingDown { .. } => None,
            Self::Applied { .. } => Some("applied"),
            Self::NotRegistered { .. } => Some("not_registered"),
            Self::RateLimited { .. } => Some("rate_limited"),
            Self::Failed { .. } => Some("failed"),
        }
    }
}

/// 订单对账 Worker
///
/// 存储与 accrual 客户端均以 trait 对象注入，冷却截止时间由 Worker 自己持有
pub struct ReconciliationWorker {
    store: Arc<dyn LedgerStore>,
    oracle: Arc<dyn AccrualOracle>,
    poll_interval: Duration,
    /// 单次 accrual 查询的超时，独立于轮询间隔
    oracle_timeout: Duration,
    selection: ReconciliationOrder,
    retry_delay: Duration,
    /// 订单号 -> 最早可再次挑选的时间
    deferred: HashMap<String, Instant>,
    state: WorkerState,
}

impl ReconciliationWorker {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        oracle: Arc<dyn AccrualOracle>,
        config: &ReconciliationConfig,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            oracle,
            poll_interval: config.poll_interval(),
            oracle_timeout,
            selection: config.selection,
            retry_delay: config.retry_delay(),
            deferred: HashMap::new(),
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// 当前暂缓重试的订单数
    pub fn deferred_orders(&self) -> usize {
        self.deferred.len()
    }

    /// 主循环：按间隔执行 tick，直到收到关闭信号
    ///
    /// 关闭信号只在 tick 之间检查，正在进行的查询与落库会自然完成
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.poll_interval,
            oracle_timeout = ?self.oracle_timeout,
            selection = ?self.selection,
            retry_delay = ?self.retry_delay,
            "对账 Worker 已启动"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                // 偏向关闭信号，保证收到关闭时能尽快退出
                biased;

                changed = shutdown.changed() => {
                    // 发送端被丢弃同样视为关闭
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                now = ticker.tick() => {
                    self.tick(now).await;
                }
            }
        }

        info!("收到关闭信号，对账 Worker 退出");
    }

    /// 执行一次对账
    ///
    /// `now` 由调用方传入，冷却判断只依赖该时间点
    pub async fn tick(&mut self, now: Instant) -> TickOutcome {
        let outcome = self.reconcile_one(now).await;
        if let Some(label) = outcome.metric_label() {
            metrics::record_reconciliation(label);
        }
        outcome
    }

    /// 失败的订单在 `retry_delay` 之后才会被再次挑选
    fn defer(&mut self, number: &str, now: Instant) {
        self.deferred.insert(number.to_string(), now + self.retry_delay);
    }

    async fn reconcile_one(&mut self, now: Instant) -> TickOutcome {
        if let WorkerState::Backoff { until } = self.state {
            if now < until {
                return TickOutcome::CoolingDown {
                    remaining: until - now,
                };
            }
            info!("accrual 冷却结束，恢复轮询");
            self.state = WorkerState::Idle;
        }

        self.deferred.retain(|_, not_before| *not_before > now);
        let skipped: Vec<String> = self.deferred.keys().cloned().collect();

        let order = match self
            .store
            .next_order_for_reconciliation(self.selection, &skipped)
            .await
        {
            Ok(Some(order)) => order,
            Ok(None) => return TickOutcome::NoPendingOrder,
            Err(e) => {
                error!(error = %e, "读取待对账订单失败");
                return TickOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let fetched = tokio::time::timeout(self.oracle_timeout, self.oracle.fetch(&order.number))
            .await
            .unwrap_or_else(|_| {
                Err(AccrualError::Unavailable(format!(
                    "查询超时 ({:?})",
                    self.oracle_timeout
                )))
            });

        let result = match fetched {
            Ok(result) => result,
            Err(AccrualError::RateLimited { retry_after }) => {
                warn!(order = %order.number, ?retry_after, "accrual 限流，暂停轮询");
                metrics::record_accrual_rate_limited();
                self.state = WorkerState::Backoff {
                    until: now + retry_after,
                };
                return TickOutcome::RateLimited { retry_after };
            }
            Err(AccrualError::NotRegistered(number)) => {
                debug!(order = %number, "accrual 尚未登记订单");
                self.defer(&order.number, now);
                return TickOutcome::NotRegistered { number };
            }
            Err(e) => {
                warn!(order = %order.number, error = %e, "accrual 查询失败，稍后重试");
                self.defer(&order.number, now);
                return TickOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let status = result.status;
        let applied = self
            .store
            .apply_reconciliation_result(&order.number, status, result.accrual, order.owner)
            .await;
        match applied {
            Ok(outcome) => {
                if outcome == ApplyOutcome::Credited {
                    if let Some(points) = result.accrual.and_then(|a| a.to_f64()) {
                        metrics::record_accrual_credit(points);
                    }
                }
                debug!(order = %order.number, %status, ?outcome, "对账结果已落库");
                TickOutcome::Applied {
                    number: order.number,
                    status,
                    outcome,
                }
            }
            Err(e) => {
                error!(order = %order.number, error = %e, "对账结果落库失败");
                self.defer(&order.number, now);
                TickOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accrual::{AccrualOutcome, MockAccrualOracle};
    use crate::error::LedgerError;
    use crate::models::Order;
    use crate::repository::MockLedgerStore;
    use mockall::predicate::eq;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn worker(store: MockLedgerStore, oracle: MockAccrualOracle) -> ReconciliationWorker {
        ReconciliationWorker::new(
            Arc::new(store),
            Arc::new(oracle),
            &ReconciliationConfig::default(),
            Duration::from_secs(1),
        )
    }

    fn pending(number: &str, owner: Uuid) -> Order {
        Order::new(number, owner)
    }

    #[tokio::test]
    async fn test_idle_when_nothing_pending() {
        let mut store = MockLedgerStore::new();
        store
            .expect_next_order_for_reconciliation()
            .returning(|_, _| Ok(None));
        let mut oracle = MockAccrualOracle::new();
        oracle.expect_fetch().never();

        let mut worker = worker(store, oracle);
        assert_eq!(worker.tick(Instant::now()).await, TickOutcome::NoPendingOrder);
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_applies_processed_result() {
        let owner = Uuid::new_v4();
        let mut store = MockLedgerStore::new();
        store
            .expect_next_order_for_reconciliation()
            .returning(move |_, _| Ok(Some(pending("12345678903", owner))));
        store
            .expect_apply_reconciliation_result()
            .with(
                eq("12345678903"),
                eq(OrderStatus::Processed),
                eq(Some(Decimal::from(500))),
                eq(owner),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(ApplyOutcome::Credited));

        let mut oracle = MockAccrualOracle::new();
        oracle.expect_fetch().returning(|n| {
            Ok(AccrualOutcome {
                order: n.to_string(),
                status: OrderStatus::Processed,
                accrual: Some(Decimal::from(500)),
            })
        });

        let mut worker = worker(store, oracle);
        let outcome = worker.tick(Instant::now()).await;
        assert_eq!(
            outcome,
            TickOutcome::Applied {
                number: "12345678903".to_string(),
                status: OrderStatus::Processed,
                outcome: ApplyOutcome::Credited,
            }
        );
    }

    #[tokio::test]
    async fn test_rate_limit_enters_backoff() {
        let owner = Uuid::new_v4();
        let mut store = MockLedgerStore::new();
        store
            .expect_next_order_for_reconciliation()
            .times(1)
            .returning(move |_, _| Ok(Some(pending("0", owner))));

        let mut oracle = MockAccrualOracle::new();
        oracle.expect_fetch().times(1).returning(|_| {
            Err(AccrualError::RateLimited {
                retry_after: Duration::from_secs(30),
            })
        });

        let mut worker = worker(store, oracle);
        let start = Instant::now();

        assert_eq!(
            worker.tick(start).await,
            TickOutcome::RateLimited {
                retry_after: Duration::from_secs(30)
            }
        );
        assert_eq!(
            worker.state(),
            WorkerState::Backoff {
                until: start + Duration::from_secs(30)
            }
        );

        // 冷却期内不访问存储也不查询 accrual
        let outcome = worker.tick(start + Duration::from_secs(29)).await;
        assert_eq!(
            outcome,
            TickOutcome::CoolingDown {
                remaining: Duration::from_secs(1)
            }
        );
    }

    #[tokio::test]
    async fn test_cooling_down_ticks_are_not_counted() {
        let owner = Uuid::new_v4();
        let mut store = MockLedgerStore::new();
        store
            .expect_next_order_for_reconciliation()
            .times(1)
            .returning(move |_, _| Ok(Some(pending("0", owner))));
        let mut oracle = MockAccrualOracle::new();
        oracle.expect_fetch().times(1).returning(|_| {
            Err(AccrualError::RateLimited {
                retry_after: Duration::from_secs(30),
            })
        });

        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _local = ::metrics::set_default_local_recorder(&recorder);

        let mut worker = worker(store, oracle);
        let start = Instant::now();
        worker.tick(start).await;
        for ms in (100..3_000).step_by(100) {
            worker.tick(start + Duration::from_millis(ms)).await;
        }

        let rendered = handle.render();
        assert!(rendered.contains(r#"reconciliation_attempts_total{outcome="rate_limited"} 1"#));
        assert!(!rendered.contains("cooling_down"));
    }

    #[tokio::test]
    async fn test_failed_order_is_skipped_until_retry_delay() {
        let owner = Uuid::new_v4();
        let mut store = MockLedgerStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_next_order_for_reconciliation()
            .withf(|_, skipped| skipped.is_empty())
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| Ok(Some(pending("18", owner))));
        store
            .expect_next_order_for_reconciliation()
            .withf(|_, skipped| skipped.len() == 1 && skipped[0] == "18")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(None));
        store
            .expect_next_order_for_reconciliation()
            .withf(|_, skipped| skipped.is_empty())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(None));

        let mut oracle = MockAccrualOracle::new();
        oracle
            .expect_fetch()
            .times(1)
            .returning(|n| Err(AccrualError::NotRegistered(n.to_string())));

        let mut worker = worker(store, oracle);
        let start = Instant::now();
        let delay = ReconciliationConfig::default().retry_delay();

        assert!(matches!(
            worker.tick(start).await,
            TickOutcome::NotRegistered { .. }
        ));
        assert_eq!(worker.deferred_orders(), 1);
        assert_eq!(worker.tick(start).await, TickOutcome::NoPendingOrder);
        assert_eq!(worker.tick(start + delay).await, TickOutcome::NoPendingOrder);
        assert_eq!(worker.deferred_orders(), 0);
    }

    #[tokio::test]
    async fn test_store_error_does_not_halt() {
        let mut store = MockLedgerStore::new();
        store
            .expect_next_order_for_reconciliation()
            .returning(|_, _| Err(LedgerError::Internal("connection reset".to_string())));
        let oracle = MockAccrualOracle::new();

        let mut worker = worker(store, oracle);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(matches!(worker.tick(now).await, TickOutcome::Failed { .. }));
        }
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_unavailable_keeps_order_pending() {
        let owner = Uuid::new_v4();
        let mut store = MockLedgerStore::new();
        store
            .expect_next_order_for_reconciliation()
            .returning(move |_, _| Ok(Some(pending("0", owner))));
        store.expect_apply_reconciliation_result().never();

        let mut oracle = MockAccrualOracle::new();
        oracle
            .expect_fetch()
            .returning(|_| Err(AccrualError::Unavailable("HTTP 503".to_string())));

        let mut worker = worker(store, oracle);
        assert!(matches!(
            worker.tick(Instant::now()).await,
            TickOutcome::Failed { .. }
        ));
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_not_registered_is_not_a_failure() {
        let owner = Uuid::new_v4();
        let mut store = MockLedgerStore::new();
        store
            .expect_next_order_for_reconciliation()
            .returning(move |_, _| Ok(Some(pending("18", owner))));
        store.expect_apply_reconciliation_result().never();

        let mut oracle = MockAccrualOracle::new();
        oracle
            .expect_fetch()
            .returning(|n| Err(AccrualError::NotRegistered(n.to_string())));

        let mut worker = worker(store, oracle);
        assert_eq!(
            worker.tick(Instant::now()).await,
            TickOutcome::NotRegistered {
                number: "18".to_string()
            }
        );
    }
}
