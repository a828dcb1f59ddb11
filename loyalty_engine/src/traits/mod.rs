//! # Ledger backend contracts
//!
//! This module defines the interface contracts that the loyalty ledger *backends* must expose.
//!
//! The traits are deliberately split along consumer lines so that each component receives the narrowest interface
//! it needs:
//!
//! * [`ReconcileLedger`] is what the reconciliation worker and the recovery sweep see: atomic settlement of an
//!   oracle verdict, and the set of orders still awaiting one.
//! * [`LedgerDatabase`] is the full contract consumed by the HTTP collaborator: order submission and listing,
//!   balance queries, and the withdrawal guard, on top of everything in [`ReconcileLedger`].

mod ledger_database;

pub use ledger_database::{LedgerDatabase, LedgerError, ReconcileLedger};
