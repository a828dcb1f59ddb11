//! The work queue: a multi-producer, single-consumer channel of order numbers awaiting reconciliation.
//!
//! Producers (the HTTP order-submission collaborator and the recovery sweep) hold cloneable [`QueueHandle`]s.
//! The worker holds the receiving [`WorkQueue`] plus a [`RequeueHandle`] — a *weak* sender — for its own
//! re-enqueues. Shutdown is simply dropping every strong handle: the channel closes, re-enqueue attempts are
//! refused, and the worker drains what is left and exits. Duplicate numbers in the queue are legal; the ledger's
//! idempotent settlement absorbs them.

use log::warn;
use loyalty_engine::db_types::OrderNumber;
use tokio::sync::mpsc;

pub fn work_queue() -> (QueueHandle, WorkQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueHandle { tx }, WorkQueue { rx })
}

/// A strong producer handle. As long as one of these is alive the queue accepts work.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<OrderNumber>,
}

impl QueueHandle {
    /// Pushes an order number onto the queue. Never blocks. Returns false only after the queue has shut down.
    pub fn enqueue(&self, number: OrderNumber) -> bool {
        match self.tx.send(number) {
            Ok(()) => true,
            Err(mpsc::error::SendError(number)) => {
                warn!("📮️ Work queue is closed. Order [{number}] was not enqueued");
                false
            },
        }
    }

    pub fn downgrade(&self) -> RequeueHandle {
        RequeueHandle { tx: self.tx.downgrade() }
    }
}

/// A weak producer handle for the worker's own re-enqueues. It keeps the queue usable without keeping it *open*:
/// once every strong handle is gone, re-enqueues are refused and the queue drains to a close.
#[derive(Clone)]
pub struct RequeueHandle {
    tx: mpsc::WeakUnboundedSender<OrderNumber>,
}

impl RequeueHandle {
    /// Pushes an order number back onto the queue. Returns false once the queue has shut down.
    pub fn enqueue(&self, number: OrderNumber) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(number).is_ok(),
            None => {
                warn!("📮️ Work queue is shutting down. Order [{number}] was not re-enqueued");
                false
            },
        }
    }
}

/// The consuming end. Owned by exactly one reconciliation worker.
pub struct WorkQueue {
    rx: mpsc::UnboundedReceiver<OrderNumber>,
}

impl WorkQueue {
    /// Waits for the next order number. Returns `None` once the queue is closed and drained.
    pub async fn next(&mut self) -> Option<OrderNumber> {
        self.rx.recv().await
    }
}
