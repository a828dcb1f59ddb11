//! Wires the pieces together and runs the worker until it is told to stop.

use std::path::Path;

use log::{info, warn};
use loyalty_engine::{sqlite::db::run_migrations, LedgerDatabase, SqliteDatabase};
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::{
    config::WorkerConfig,
    errors::WorkerError,
    oracle::HttpAccrualOracle,
    queue::{work_queue, QueueHandle},
    reconciler::Reconciler,
    sweep::{recovery_sweep, start_sweep_worker},
};

/// Runs the reconciliation service to completion.
///
/// Startup order matters: migrations run first, then the recovery sweep re-feeds every order a previous run left
/// pending, and only then does the consumer loop start draining the queue. A failed sweep at startup is fatal —
/// continuing would silently strand orders.
///
/// Shutdown is Ctrl-C: the strong queue handles are dropped, the periodic sweep is aborted, and the worker drains
/// whatever is already queued before exiting.
pub async fn run_worker(config: WorkerConfig) -> Result<(), WorkerError> {
    create_database_if_missing(&config.database_url).await?;
    let mut db = SqliteDatabase::new_with_url(&config.database_url, config.max_db_connections).await?;
    run_migrations(db.pool()).await?;
    info!("🗃️ Ledger database is ready at {}", db.url());

    let oracle = HttpAccrualOracle::new(&config.accrual_url, config.oracle_timeout)
        .map_err(|e| WorkerError::OracleSetup(e.to_string()))?;
    info!("🔮️ Polling accrual oracle at {}", config.accrual_url);

    let (handle, queue) = work_queue();
    let requeue = handle.downgrade();

    recovery_sweep(&db, &handle).await?;

    let reconciler = Reconciler::new(db.clone(), oracle, queue, requeue, config.retry_delay);
    let worker = tokio::spawn(reconciler.run());
    let sweeper = config.sweep_interval.map(|interval| start_sweep_worker(db.clone(), handle.clone(), interval));

    wait_for_shutdown(handle).await;
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    if let Err(e) = worker.await {
        warn!("🚀️ Reconciliation worker ended abnormally: {e}");
    }
    db.close().await?;
    Ok(())
}

async fn create_database_if_missing(url: &str) -> Result<(), WorkerError> {
    if Sqlite::database_exists(url).await? {
        return Ok(());
    }
    if let Some(dir) = Path::new(url.trim_start_matches("sqlite://")).parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| WorkerError::ConfigurationError(format!("Could not create the database directory: {e}")))?;
    }
    Sqlite::create_database(url).await?;
    info!("🗃️ Created a fresh ledger database at {url}");
    Ok(())
}

/// Holds the last strong queue handle until Ctrl-C, then drops it so the queue can drain to a close.
async fn wait_for_shutdown(handle: QueueHandle) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("🚀️ Shutdown signal received. Draining the work queue"),
        Err(e) => warn!("🚀️ Could not listen for the shutdown signal ({e}). Shutting down"),
    }
    drop(handle);
}
