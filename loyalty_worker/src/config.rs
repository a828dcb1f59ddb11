//! Worker configuration, assembled from environment variables with sensible defaults.

use std::time::Duration;

use log::warn;
use loyalty_engine::sqlite::db::db_url;

pub const DEFAULT_ACCRUAL_URL: &str = "http://localhost:8080";
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
pub const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_DB_CONNECTIONS: u32 = 25;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Connection string for the ledger database. `LOYALTY_DATABASE_URL`.
    pub database_url: String,
    /// Base URL of the external accrual service. `LOYALTY_ACCRUAL_URL`.
    pub accrual_url: String,
    /// How long to wait before re-polling an unsettled order. `LOYALTY_RETRY_DELAY_MS`.
    pub retry_delay: Duration,
    /// Cadence of the periodic recovery sweep. `LOYALTY_SWEEP_INTERVAL_SECS`; 0 or unset means the sweep runs at
    /// startup only.
    pub sweep_interval: Option<Duration>,
    /// Per-request timeout against the accrual service. `LOYALTY_ORACLE_TIMEOUT_MS`.
    pub oracle_timeout: Duration,
    /// `LOYALTY_MAX_DB_CONNECTIONS`.
    pub max_db_connections: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: db_url(),
            accrual_url: DEFAULT_ACCRUAL_URL.to_string(),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            sweep_interval: None,
            oracle_timeout: Duration::from_millis(DEFAULT_ORACLE_TIMEOUT_MS),
            max_db_connections: DEFAULT_MAX_DB_CONNECTIONS,
        }
    }
}

impl WorkerConfig {
    pub fn from_env_or_default() -> Self {
        let accrual_url = std::env::var("LOYALTY_ACCRUAL_URL").unwrap_or_else(|_| {
            warn!("🪛️ LOYALTY_ACCRUAL_URL is not set. Using the default, {DEFAULT_ACCRUAL_URL}");
            DEFAULT_ACCRUAL_URL.to_string()
        });
        let accrual_url = accrual_url.trim_end_matches('/').to_string();
        let retry_delay = Duration::from_millis(env_u64("LOYALTY_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS));
        let sweep_interval = match env_u64("LOYALTY_SWEEP_INTERVAL_SECS", 0) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let oracle_timeout = Duration::from_millis(env_u64("LOYALTY_ORACLE_TIMEOUT_MS", DEFAULT_ORACLE_TIMEOUT_MS));
        let max_db_connections =
            u32::try_from(env_u64("LOYALTY_MAX_DB_CONNECTIONS", u64::from(DEFAULT_MAX_DB_CONNECTIONS)))
                .unwrap_or(DEFAULT_MAX_DB_CONNECTIONS);
        Self {
            database_url: db_url(),
            accrual_url,
            retry_delay,
            sweep_interval,
            oracle_timeout,
            max_db_connections,
        }
    }
}

fn env_u64(var: &str, default: u64) -> u64 {
    match std::env::var(var) {
        Ok(s) => s.trim().parse::<u64>().unwrap_or_else(|_| {
            warn!("🪛️ {var} is set but is not a number ({s}). Using the default, {default}");
            default
        }),
        Err(_) => default,
    }
}
