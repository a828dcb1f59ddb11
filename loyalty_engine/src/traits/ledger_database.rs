use std::future::Future;

use lp_common::Points;
use thiserror::Error;

use crate::db_types::{
    BalanceSummary,
    NewOrder,
    Order,
    OrderClaim,
    OrderNumber,
    OrderStatus,
    ReconcileOutcome,
    Withdrawal,
    WithdrawalOutcome,
};

/// The slice of ledger behaviour that the reconciliation pipeline depends on.
///
/// Both operations must be safe to call concurrently and repeatedly with the same order number: the queue can
/// legitimately hold duplicate work items, and settlement must be idempotent.
///
/// The methods are declared as `impl Future + Send` rather than `async fn` so that the worker and the sweep can
/// hand the futures to `tokio::spawn` with the backend still generic. Implementations can use plain `async fn`.
pub trait ReconcileLedger: Clone + Send + Sync {
    /// Applies an oracle verdict to the order in a single atomic transaction.
    ///
    /// The status write is conditional on the order still being in a non-terminal state. If the verdict is
    /// `Processed`, the accrual is recorded on the order row and credited to the owning user's balance inside the
    /// same transaction. Either both writes commit or neither does.
    ///
    /// Returns [`ReconcileOutcome::AlreadySettled`] (and writes nothing) if the order has already reached a
    /// terminal state, which is how a duplicate work item is absorbed without double-crediting.
    ///
    /// A negative `accrual` is rejected with an error before anything is written.
    fn apply_accrual(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Points,
    ) -> impl Future<Output = Result<ReconcileOutcome, LedgerError>> + Send;

    /// All order numbers whose status is non-terminal, oldest first. The recovery sweep feeds these back into the
    /// work queue after a restart.
    fn pending_orders(&self) -> impl Future<Output = Result<Vec<OrderNumber>, LedgerError>> + Send;
}

/// The full contract for backends supporting the loyalty engine.
///
/// This behaviour includes:
/// * Recording submitted orders and answering order-history queries
/// * The accrual settlement flow (via [`ReconcileLedger`])
/// * Balance queries and the atomic withdrawal guard
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase: ReconcileLedger {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Records a newly submitted order with `NEW` status, idempotently.
    ///
    /// An order number is claimed by exactly one user forever. Resubmission by the owner and a claim attempt by
    /// anyone else both leave the ledger untouched and are distinguished in the returned [`OrderClaim`].
    async fn submit_order(&self, order: NewOrder) -> Result<OrderClaim, LedgerError>;

    /// Fetches the order with the given number, if it exists.
    async fn fetch_order(&self, number: &OrderNumber) -> Result<Option<Order>, LedgerError>;

    /// All orders submitted by the user, oldest first.
    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, LedgerError>;

    /// Creates the user's zero balance row if it does not exist yet. Called by the registration collaborator.
    async fn ensure_account(&self, user_id: &str) -> Result<(), LedgerError>;

    /// The user's current balance and lifetime withdrawn total.
    async fn balance(&self, user_id: &str) -> Result<BalanceSummary, LedgerError>;

    /// Attempts to debit `amount` from the user's balance and record the withdrawal, as one atomic transaction.
    ///
    /// The debit is conditional on `balance >= amount` *inside* the transaction, so two concurrent withdrawal
    /// requests can never both pass the check against the same points.
    ///
    /// Insufficient funds is a defined business outcome, not an error. A non-positive `amount` is rejected with
    /// an error before anything is written; only terminal accrual credits may ever raise a balance.
    async fn withdraw(
        &self,
        user_id: &str,
        number: &OrderNumber,
        amount: Points,
    ) -> Result<WithdrawalOutcome, LedgerError>;

    /// All withdrawals recorded for the user, oldest first.
    async fn withdrawals_for_user(&self, user_id: &str) -> Result<Vec<Withdrawal>, LedgerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The order {0} does not exist in the ledger")]
    OrderNotFound(OrderNumber),
    #[error("No balance account exists for user {0}")]
    AccountNotFound(String),
    #[error("Refusing to apply a negative accrual ({accrual}) to order {number}")]
    NegativeAccrual { number: OrderNumber, accrual: Points },
    #[error("Refusing to withdraw a non-positive sum ({amount}) for user {user_id}")]
    NonPositiveWithdrawal { user_id: String, amount: Points },
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
