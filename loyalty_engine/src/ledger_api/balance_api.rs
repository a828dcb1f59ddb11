use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::debug;
use lp_common::Points;
use serde::Serialize;

use crate::{
    db_types::{BalanceSummary, OrderNumber, Withdrawal, WithdrawalOutcome},
    traits::{LedgerDatabase, LedgerError},
};

/// The `BalanceApi` exposes balance queries and the withdrawal guard to the HTTP layer.
pub struct BalanceApi<B> {
    db: B,
}

impl<B: Debug> Debug for BalanceApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BalanceApi ({:?})", self.db)
    }
}

impl<B> BalanceApi<B>
where B: LedgerDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Creates the user's balance account if needed. Registration hook.
    pub async fn register_user(&self, user_id: &str) -> Result<(), LedgerError> {
        self.db.ensure_account(user_id).await
    }

    /// The user's current balance and lifetime withdrawn total.
    pub async fn balance(&self, user_id: &str) -> Result<BalanceSummary, LedgerError> {
        self.db.balance(user_id).await
    }

    /// Attempts to spend `amount` points against the (Luhn-valid) `number`. The number does not need to refer to
    /// a credited order. The three outcomes map directly onto the HTTP layer's status codes.
    pub async fn withdraw(
        &self,
        user_id: &str,
        number: OrderNumber,
        amount: Points,
    ) -> Result<WithdrawalOutcome, LedgerError> {
        let outcome = self.db.withdraw(user_id, &number, amount).await?;
        debug!("💸️ Withdrawal [{number}] of {amount} for user {user_id}: {outcome:?}");
        Ok(outcome)
    }

    /// The user's withdrawal history, oldest first, in the wire shape.
    pub async fn withdrawals_for_user(&self, user_id: &str) -> Result<Vec<WithdrawalSummary>, LedgerError> {
        let withdrawals = self.db.withdrawals_for_user(user_id).await?;
        Ok(withdrawals.into_iter().map(WithdrawalSummary::from).collect())
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

/// User-facing view of a withdrawal row.
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalSummary {
    pub order: OrderNumber,
    pub sum: Points,
    pub processed_at: DateTime<Utc>,
}

impl From<Withdrawal> for WithdrawalSummary {
    fn from(w: Withdrawal) -> Self {
        Self { order: w.number, sum: w.amount, processed_at: w.processed_at }
    }
}
