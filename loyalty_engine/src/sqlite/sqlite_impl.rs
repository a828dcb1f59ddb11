//! `SqliteDatabase` is the concrete SQLite implementation of the loyalty ledger.
//!
//! Every multi-row guarantee (settlement + credit, debit + withdrawal row) is a single `pool.begin()` transaction,
//! and every guard is a conditional SQL write. The database, not the process, is the source of atomicity: several
//! instances of the service can share one ledger safely.
use std::fmt::Debug;

use log::*;
use lp_common::Points;
use sqlx::SqlitePool;

use super::db::{balances, db_url, new_pool, orders, withdrawals};
use crate::{
    db_types::{
        BalanceSummary,
        NewOrder,
        Order,
        OrderClaim,
        OrderNumber,
        OrderStatus,
        ReconcileOutcome,
        Withdrawal,
        WithdrawalOutcome,
    },
    traits::{LedgerDatabase, LedgerError, ReconcileLedger},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl ReconcileLedger for SqliteDatabase {
    async fn apply_accrual(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Points,
    ) -> Result<ReconcileOutcome, LedgerError> {
        if accrual.is_negative() {
            return Err(LedgerError::NegativeAccrual { number: number.clone(), accrual });
        }
        // Only a PROCESSED verdict carries points onto the order row and the balance.
        let credited = match status {
            OrderStatus::Processed => accrual,
            _ => Points::default(),
        };
        let mut tx = self.pool.begin().await?;
        let settled = orders::guarded_settle(number, status, credited, &mut tx).await?;
        let outcome = match settled {
            Some(order) => {
                if order.status == OrderStatus::Processed {
                    balances::credit(&order.user_id, credited, &mut tx).await?;
                    debug!("🗃️ Order [{number}] settled as PROCESSED; {credited} points credited to {}", order.user_id);
                } else {
                    debug!("🗃️ Order [{number}] moved to {status}");
                }
                ReconcileOutcome::Applied(order)
            },
            None => {
                let current = orders::fetch_order_by_number(number, &mut tx)
                    .await?
                    .ok_or_else(|| LedgerError::OrderNotFound(number.clone()))?;
                if current.status.is_terminal() {
                    debug!("🗃️ Order [{number}] is already {}. Verdict {status} ignored", current.status);
                    ReconcileOutcome::AlreadySettled(current)
                } else {
                    debug!("🗃️ Order [{number}] is already {}, ahead of stale verdict {status}", current.status);
                    ReconcileOutcome::Stale(current)
                }
            },
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn pending_orders(&self) -> Result<Vec<OrderNumber>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let numbers = orders::fetch_pending_numbers(&mut conn).await?;
        Ok(numbers)
    }
}

impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn submit_order(&self, order: NewOrder) -> Result<OrderClaim, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let claim = orders::idempotent_insert(order.clone(), &mut tx).await?;
        if let OrderClaim::Accepted(_) = &claim {
            balances::ensure_account(&order.user_id, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(claim)
    }

    async fn fetch_order(&self, number: &OrderNumber) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_number(number, &mut conn).await?;
        Ok(order)
    }

    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_for_user(user_id, &mut conn).await?;
        Ok(orders)
    }

    async fn ensure_account(&self, user_id: &str) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        balances::ensure_account(user_id, &mut conn).await
    }

    async fn balance(&self, user_id: &str) -> Result<BalanceSummary, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let summary = balances::fetch_balance(user_id, &mut conn)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;
        Ok(summary)
    }

    async fn withdraw(
        &self,
        user_id: &str,
        number: &OrderNumber,
        amount: Points,
    ) -> Result<WithdrawalOutcome, LedgerError> {
        // A negative sum would sail through the `current >= $1` guard and mint points.
        if amount.value() <= 0 {
            return Err(LedgerError::NonPositiveWithdrawal { user_id: user_id.to_string(), amount });
        }
        let mut tx = self.pool.begin().await?;
        // The debit goes first: it is a conditional write, and it acquires the write lock before anything is read.
        let debited = balances::try_debit(user_id, amount, &mut tx).await?;
        if !debited {
            tx.rollback().await?;
            debug!("🗃️ Withdrawal of {amount} for user {user_id} rejected: insufficient funds");
            return Ok(WithdrawalOutcome::InsufficientFunds);
        }
        let withdrawal = withdrawals::insert_withdrawal(user_id, number, amount, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Withdrawal [{}] of {amount} recorded for user {user_id}", withdrawal.number);
        Ok(WithdrawalOutcome::Accepted)
    }

    async fn withdrawals_for_user(&self, user_id: &str) -> Result<Vec<Withdrawal>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        withdrawals::fetch_withdrawals_for_user(user_id, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
