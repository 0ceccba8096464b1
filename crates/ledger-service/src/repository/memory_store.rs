//! 内存账本存储
//!
//! 单把互斥锁保护全部状态，每个操作在持锁期间完成，天然满足原子性。
//! 适用于测试和本地开发，进程退出后数据丢失。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use loyalty_shared::config::ReconciliationOrder;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::traits::LedgerStore;
use crate::error::{LedgerError, Result};
use crate::models::{ApplyOutcome, Balance, Order, OrderStatus, User, Withdrawal};
use crate::validation::{validate_accrual, validate_withdrawal_sum};

#[derive(Debug, Default)]
struct State {
    users: HashMap<String, User>,
    balances: HashMap<Uuid, Balance>,
    /// 订单号 -> (插入序号, 订单)，序号用于上传时间相同时稳定排序
    orders: HashMap<String, (u64, Order)>,
    withdrawals: Vec<Withdrawal>,
    next_seq: u64,
}

/// 内存账本存储
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接读取订单，测试断言用
    pub fn order(&self, number: &str) -> Option<Order> {
        self.state.lock().orders.get(number).map(|(_, o)| o.clone())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn register(&self, login: &str, password_hash: &str, salt: &str) -> Result<Uuid> {
        let mut state = self.state.lock();
        if state.users.contains_key(login) {
            return Err(LedgerError::LoginAlreadyTaken(login.to_string()));
        }

        let user_id = Uuid::new_v4();
        state.users.insert(
            login.to_string(),
            User {
                user_id,
                login: login.to_string(),
                password_hash: password_hash.to_string(),
                salt: salt.to_string(),
            },
        );
        state.balances.insert(user_id, Balance::default());
        Ok(user_id)
    }

    async fn find_user(&self, login: &str) -> Result<User> {
        self.state
            .lock()
            .users
            .get(login)
            .cloned()
            .ok_or_else(|| LedgerError::UserNotFound(login.to_string()))
    }

    async fn submit_order(&self, number: &str, owner: Uuid) -> Result<()> {
        let mut state = self.state.lock();
        if let Some((_, existing)) = state.orders.get(number) {
            return Err(if existing.owner == owner {
                LedgerError::OrderAlreadyAdded(number.to_string())
            } else {
                LedgerError::OrderOwnedByAnotherUser(number.to_string())
            });
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .orders
            .insert(number.to_string(), (seq, Order::new(number, owner)));
        Ok(())
    }

    async fn list_orders(&self, owner: Uuid) -> Result<Vec<Order>> {
        let state = self.state.lock();
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|(_, o)| o.owner == owner)
            .collect();
        if orders.is_empty() {
            return Err(LedgerError::NoOrders);
        }

        orders.sort_by_key(|(seq, o)| (o.uploaded_at, *seq));
        Ok(orders.into_iter().map(|(_, o)| o.clone()).collect())
    }

    async fn get_balance(&self, owner: Uuid) -> Result<Balance> {
        self.state
            .lock()
            .balances
            .get(&owner)
            .copied()
            .ok_or(LedgerError::BalanceNotFound(owner))
    }

    async fn withdraw(&self, owner: Uuid, number: &str, sum: Decimal) -> Result<()> {
        validate_withdrawal_sum(sum)?;

        let mut state = self.state.lock();
        let balance = state
            .balances
            .get_mut(&owner)
            .ok_or(LedgerError::BalanceNotFound(owner))?;

        if balance.current - sum < Decimal::ZERO {
            return Err(LedgerError::InsufficientBalance {
                requested: sum,
                available: balance.current,
            });
        }
        balance.current -= sum;
        balance.withdrawn += sum;

        state.withdrawals.push(Withdrawal {
            owner,
            order_number: number.to_string(),
            sum,
            processed_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_withdrawals(&self, owner: Uuid) -> Result<Vec<Withdrawal>> {
        // 追加顺序即处理时间顺序
        let withdrawals: Vec<_> = self
            .state
            .lock()
            .withdrawals
            .iter()
            .filter(|w| w.owner == owner)
            .cloned()
            .collect();

        if withdrawals.is_empty() {
            return Err(LedgerError::NoWithdrawals);
        }
        Ok(withdrawals)
    }

    async fn next_order_for_reconciliation(
        &self,
        selection: ReconciliationOrder,
        skipped: &[String],
    ) -> Result<Option<Order>> {
        let state = self.state.lock();
        let candidates = state
            .orders
            .values()
            .filter(|(_, o)| o.status == OrderStatus::New && !skipped.contains(&o.number));

        let picked = match selection {
            ReconciliationOrder::NewestFirst => {
                candidates.max_by_key(|(seq, o)| (o.uploaded_at, *seq))
            }
            ReconciliationOrder::OldestFirst => {
                candidates.min_by_key(|(seq, o)| (o.uploaded_at, *seq))
            }
        };
        Ok(picked.map(|(_, o)| o.clone()))
    }

    async fn apply_reconciliation_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
        _owner: Uuid,
    ) -> Result<ApplyOutcome> {
        validate_accrual(number, accrual)?;

        let mut state = self.state.lock();
        let (_, order) = state
            .orders
            .get(number)
            .ok_or_else(|| LedgerError::OrderNotFound(number.to_string()))?;

        if !order.status.can_transition_to(status) {
            return Ok(ApplyOutcome::Unchanged);
        }
        let row_owner = order.owner;
        let accrual = accrual.filter(|_| status == OrderStatus::Processed);

        // 先确认余额行存在，失败时订单保持原状
        if accrual.is_some() && !state.balances.contains_key(&row_owner) {
            return Err(LedgerError::BalanceNotFound(row_owner));
        }

        if let Some((_, order)) = state.orders.get_mut(number) {
            order.status = status;
            order.accrual = accrual;
        }

        match accrual {
            Some(points) => {
                if let Some(balance) = state.balances.get_mut(&row_owner) {
                    balance.current += points;
                }
                Ok(ApplyOutcome::Credited)
            }
            None => Ok(ApplyOutcome::Updated),
        }
    }
}
