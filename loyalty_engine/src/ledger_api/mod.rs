//! Public-facing ledger APIs.
//!
//! Thin, backend-generic wrappers that the HTTP collaborator consumes. They validate nothing themselves beyond
//! what the types enforce ([`crate::db_types::OrderNumber`] is Luhn-checked at construction) and translate ledger
//! rows into the wire shapes users see.

mod balance_api;
mod order_api;

pub use balance_api::{BalanceApi, WithdrawalSummary};
pub use order_api::{OrderApi, OrderSummary};
