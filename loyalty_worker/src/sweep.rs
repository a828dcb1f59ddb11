//! The recovery sweep.
//!
//! A restart must never strand an order: anything the ledger still holds in a non-terminal state is put back on
//! the work queue. The sweep runs once at startup, and optionally on a timer as a safety net for orders that fell
//! off the queue (a re-enqueue refused during shutdown, for instance). Duplicates are harmless; settlement is
//! idempotent.

use std::time::Duration;

use log::{debug, info, warn};
use loyalty_engine::{LedgerError, ReconcileLedger};
use tokio::task::JoinHandle;

use crate::queue::QueueHandle;

/// Re-enqueues every non-terminal order in the ledger. Returns how many were enqueued.
pub async fn recovery_sweep<B: ReconcileLedger>(db: &B, handle: &QueueHandle) -> Result<usize, LedgerError> {
    let pending = db.pending_orders().await?;
    let mut enqueued = 0;
    for number in pending {
        if handle.enqueue(number) {
            enqueued += 1;
        }
    }
    info!("🕰️ Recovery sweep complete. {enqueued} pending order(s) re-enqueued");
    Ok(enqueued)
}

/// Spawns a periodic recovery sweep. Do NOT await the handle, or your thread will block forever. Dropping the
/// `QueueHandle` clone held by the task requires aborting the handle at shutdown.
pub fn start_sweep_worker<B>(db: B, handle: QueueHandle, interval: Duration) -> JoinHandle<()>
where
    B: ReconcileLedger + 'static,
{
    info!("🕰️ Starting periodic recovery sweep every {interval:?}");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick fires immediately and the startup sweep already ran
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("🕰️ Running periodic recovery sweep");
            if let Err(e) = recovery_sweep(&db, &handle).await {
                warn!("🕰️ Recovery sweep failed: {e}");
            }
        }
    })
}
