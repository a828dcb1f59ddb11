use loyalty_engine::LedgerError;
use thiserror::Error;

/// Fatal startup errors. Once the worker is running, failures are retried or dropped per order and never bubble
/// up here.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Could not initialize the worker. {0}")]
    ConfigurationError(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] LedgerError),
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),
    #[error("Could not build the accrual service client. {0}")]
    OracleSetup(String),
}
