//! Loyalty Points Engine
//!
//! The loyalty engine is the durable half of the loyalty-points service: it owns the order ledger, the per-user
//! balance ledger and the withdrawal log, and it guarantees that points are never double-credited or lost.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You should never need to
//!    access the database directly. Instead, use the public API provided by the engine. The exception is the data
//!    types used in the database. These are defined in the `db_types` module and are public.
//! 2. The engine public API ([`mod@ledger_api`]). This provides the functionality that collaborators (the HTTP
//!    layer and the reconciliation worker) consume: order submission, balance queries, the withdrawal guard, and
//!    the atomic accrual settlement used by the worker. Specific backends need to implement the traits in the
//!    [`mod@traits`] module in order to act as a ledger for the service.

pub mod db_types;
mod ledger_api;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use ledger_api::{BalanceApi, OrderApi, OrderSummary, WithdrawalSummary};
pub use traits::{LedgerDatabase, LedgerError, ReconcileLedger};
