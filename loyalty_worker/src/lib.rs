//! The reconciliation half of the loyalty-points service.
//!
//! Orders enter the ledger as `NEW` and leave as `PROCESSED` or `INVALID`; everything in between is this crate's
//! job. A single consumer loop ([`reconciler::Reconciler`]) drains the work queue, asks the external accrual
//! oracle what each order earns, and settles the verdict into the ledger through the atomic
//! [`loyalty_engine::ReconcileLedger`] contract. The [`sweep`] module re-feeds orders left pending by a previous
//! run, so a restart never strands an order.

pub mod config;
pub mod errors;
pub mod oracle;
pub mod queue;
pub mod reconciler;
pub mod service;
pub mod sweep;
