//! The reconciliation loop.
//!
//! One consumer drains the work queue, polls the oracle for each order, and settles verdicts into the ledger.
//! Three classes of answer drive three behaviours:
//! * A terminal verdict (`PROCESSED` / `INVALID`) settles the order and credits the account, exactly once.
//! * A non-terminal answer, a transient failure, or a stale verdict puts the order back on the queue after a
//!   short delay.
//! * A structurally wrong answer (order mismatch, negative accrual) is logged and dropped. No retry can fix it.
//!
//! A 429 from the oracle pauses the whole loop for the advertised cooldown. The paused item is retried in place
//! rather than re-enqueued, so the pause costs nothing but time.

use std::time::Duration;

use log::{debug, error, info, warn};
use loyalty_engine::{
    db_types::{OrderNumber, ReconcileOutcome},
    LedgerError,
    ReconcileLedger,
};
use tokio::time::sleep;

use crate::{
    oracle::{AccrualOracle, AccrualSnapshot, OracleError},
    queue::{RequeueHandle, WorkQueue},
};

pub struct Reconciler<B, O>
where
    B: ReconcileLedger,
    O: AccrualOracle,
{
    db: B,
    oracle: O,
    queue: WorkQueue,
    requeue: RequeueHandle,
    retry_delay: Duration,
}

impl<B, O> Reconciler<B, O>
where
    B: ReconcileLedger,
    O: AccrualOracle,
{
    pub fn new(db: B, oracle: O, queue: WorkQueue, requeue: RequeueHandle, retry_delay: Duration) -> Self {
        Self { db, oracle, queue, requeue, retry_delay }
    }

    /// Runs until the queue is closed and drained. Consumes the reconciler; there is exactly one loop per queue.
    pub async fn run(mut self) {
        info!("💸️ Reconciliation worker is running");
        while let Some(number) = self.queue.next().await {
            self.process(number).await;
        }
        info!("💸️ Work queue is closed and drained. Reconciliation worker is shutting down");
    }

    async fn process(&mut self, number: OrderNumber) {
        loop {
            match self.oracle.fetch(&number).await {
                Ok(snapshot) => {
                    self.settle(number, snapshot).await;
                    return;
                },
                Err(OracleError::RateLimited(pause)) => {
                    warn!("💸️ Accrual oracle is rate limited. Pausing all polling for {pause:?}");
                    sleep(pause).await;
                    // retry the same order; it was never at fault
                },
                Err(e) if e.is_hard() => {
                    error!("💸️ Dropping order [{number}]. {e}");
                    return;
                },
                Err(e) => {
                    debug!("💸️ Order [{number}] is not settled yet. {e}");
                    self.retry_later(number).await;
                    return;
                },
            }
        }
    }

    /// Applies a verdict to the ledger and decides whether the order needs another poll.
    async fn settle(&self, number: OrderNumber, snapshot: AccrualSnapshot) {
        let status = snapshot.status.as_order_status();
        let accrual = snapshot.accrual.unwrap_or_default();
        match self.db.apply_accrual(&number, status, accrual).await {
            Ok(ReconcileOutcome::Applied(_)) if status.is_terminal() => {
                info!("💸️ Order [{number}] settled as {status} with accrual {accrual}");
            },
            Ok(ReconcileOutcome::Applied(_)) => {
                debug!("💸️ Order [{number}] advanced to {status}. Polling again later");
                self.retry_later(number).await;
            },
            Ok(ReconcileOutcome::AlreadySettled(_)) => {
                debug!("💸️ Order [{number}] was already settled. Nothing to do");
            },
            Ok(ReconcileOutcome::Stale(_)) => {
                debug!("💸️ Oracle verdict for order [{number}] is behind the ledger. Polling again later");
                self.retry_later(number).await;
            },
            Err(LedgerError::OrderNotFound(_)) => {
                error!("💸️ Dropping order [{number}]. It is not in the ledger");
            },
            Err(LedgerError::NegativeAccrual { .. }) => {
                error!("💸️ Dropping order [{number}]. The oracle offered a negative accrual");
            },
            Err(e) => {
                warn!("💸️ Could not settle order [{number}]: {e}. Retrying later");
                self.retry_later(number).await;
            },
        }
    }

    async fn retry_later(&self, number: OrderNumber) {
        sleep(self.retry_delay).await;
        self.requeue.enqueue(number);
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::{HashMap, VecDeque},
        sync::{Arc, Mutex},
        time::Duration,
    };

    use chrono::Utc;
    use loyalty_engine::db_types::{Order, OrderStatus};
    use lp_common::Points;

    use super::*;
    use crate::{oracle::AccrualStatus, queue::work_queue};

    /// An oracle that plays back a scripted sequence of answers.
    #[derive(Clone)]
    struct ScriptedOracle {
        script: Arc<Mutex<VecDeque<Result<AccrualSnapshot, OracleError>>>>,
    }

    impl ScriptedOracle {
        fn new(script: Vec<Result<AccrualSnapshot, OracleError>>) -> Self {
            Self { script: Arc::new(Mutex::new(script.into_iter().collect())) }
        }

        fn exhausted(&self) -> bool {
            self.script.lock().unwrap().is_empty()
        }
    }

    impl AccrualOracle for ScriptedOracle {
        async fn fetch(&self, number: &OrderNumber) -> Result<AccrualSnapshot, OracleError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(OracleError::NotReady(number.clone())))
        }
    }

    /// An in-memory ledger that honors the settlement contract closely enough for worker tests.
    #[derive(Clone, Default)]
    struct MemoryLedger {
        orders: Arc<Mutex<HashMap<String, (OrderStatus, Points)>>>,
        credits: Arc<Mutex<Vec<(String, Points)>>>,
    }

    impl MemoryLedger {
        fn with_order(self, number: &str) -> Self {
            self.orders.lock().unwrap().insert(number.to_string(), (OrderStatus::New, Points::default()));
            self
        }

        fn status_of(&self, number: &str) -> OrderStatus {
            self.orders.lock().unwrap()[number].0
        }

        fn credits(&self) -> Vec<(String, Points)> {
            self.credits.lock().unwrap().clone()
        }
    }

    fn order_row(number: &OrderNumber, status: OrderStatus, accrual: Points) -> Order {
        Order {
            id: 0,
            number: number.clone(),
            user_id: "alice".to_string(),
            status,
            accrual,
            uploaded_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    impl ReconcileLedger for MemoryLedger {
        async fn apply_accrual(
            &self,
            number: &OrderNumber,
            status: OrderStatus,
            accrual: Points,
        ) -> Result<ReconcileOutcome, LedgerError> {
            let mut orders = self.orders.lock().unwrap();
            let Some(entry) = orders.get_mut(number.as_str()) else {
                return Err(LedgerError::OrderNotFound(number.clone()));
            };
            if entry.0.is_terminal() {
                return Ok(ReconcileOutcome::AlreadySettled(order_row(number, entry.0, entry.1)));
            }
            if status.rank() < entry.0.rank() {
                return Ok(ReconcileOutcome::Stale(order_row(number, entry.0, entry.1)));
            }
            *entry = (status, accrual);
            if status == OrderStatus::Processed {
                self.credits.lock().unwrap().push((number.to_string(), accrual));
            }
            Ok(ReconcileOutcome::Applied(order_row(number, status, accrual)))
        }

        async fn pending_orders(&self) -> Result<Vec<OrderNumber>, LedgerError> {
            let orders = self.orders.lock().unwrap();
            Ok(orders
                .iter()
                .filter(|(_, (s, _))| !s.is_terminal())
                .map(|(n, _)| n.parse().unwrap())
                .collect())
        }
    }

    fn number(s: &str) -> OrderNumber {
        s.parse().unwrap()
    }

    fn snapshot(order: &str, status: AccrualStatus, accrual: Option<f64>) -> AccrualSnapshot {
        AccrualSnapshot {
            order: order.to_string(),
            status,
            accrual: accrual.map(|a| Points::try_from(a).unwrap()),
        }
    }

    /// Feeds the orders in, keeps the queue open until the oracle script runs dry, then lets the worker drain
    /// and exit.
    async fn run_to_completion(db: MemoryLedger, oracle: ScriptedOracle, numbers: &[&str]) {
        let (handle, queue) = work_queue();
        let requeue = handle.downgrade();
        for n in numbers {
            handle.enqueue(number(n));
        }
        let watch = oracle.clone();
        tokio::spawn(async move {
            while !watch.exhausted() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            drop(handle);
        });
        Reconciler::new(db, oracle, queue, requeue, Duration::from_millis(50)).run().await;
    }

    #[tokio::test(start_paused = true)]
    async fn an_order_is_polled_until_terminal_and_credited_once() {
        let db = MemoryLedger::default().with_order("79927398713");
        let oracle = ScriptedOracle::new(vec![
            Ok(snapshot("79927398713", AccrualStatus::Registered, None)),
            Ok(snapshot("79927398713", AccrualStatus::Processing, None)),
            Ok(snapshot("79927398713", AccrualStatus::Processed, Some(729.98))),
        ]);
        run_to_completion(db.clone(), oracle.clone(), &["79927398713"]).await;

        assert!(oracle.exhausted());
        assert_eq!(db.status_of("79927398713"), OrderStatus::Processed);
        assert_eq!(db.credits(), vec![("79927398713".to_string(), Points::try_from(729.98).unwrap())]);
    }

    #[tokio::test(start_paused = true)]
    async fn a_rate_limit_pauses_the_loop_without_losing_the_order() {
        let db = MemoryLedger::default().with_order("79927398713");
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::RateLimited(Duration::from_secs(5))),
            Ok(snapshot("79927398713", AccrualStatus::Processed, Some(10.0))),
        ]);

        let started = tokio::time::Instant::now();
        run_to_completion(db.clone(), oracle, &["79927398713"]).await;

        assert!(started.elapsed() >= Duration::from_secs(5), "the advertised cooldown must be honored");
        assert_eq!(db.status_of("79927398713"), OrderStatus::Processed);
        assert_eq!(db.credits().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_mismatched_answer_drops_the_order_but_not_its_neighbours() {
        let db = MemoryLedger::default().with_order("79927398713").with_order("49927398716");
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::OrderMismatch { asked: number("79927398713"), answered: "42".to_string() }),
            Ok(snapshot("49927398716", AccrualStatus::Invalid, None)),
        ]);
        run_to_completion(db.clone(), oracle, &["79927398713", "49927398716"]).await;

        // The poisoned order is abandoned where it stood; the next one settles normally.
        assert_eq!(db.status_of("79927398713"), OrderStatus::New);
        assert_eq!(db.status_of("49927398716"), OrderStatus::Invalid);
        assert!(db.credits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_put_the_order_back_on_the_queue() {
        let db = MemoryLedger::default().with_order("12345678903");
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::Transient("connection refused".to_string())),
            Err(OracleError::NotReady(number("12345678903"))),
            Ok(snapshot("12345678903", AccrualStatus::Processed, Some(5.0))),
        ]);
        run_to_completion(db.clone(), oracle.clone(), &["12345678903"]).await;

        assert!(oracle.exhausted());
        assert_eq!(db.status_of("12345678903"), OrderStatus::Processed);
        assert_eq!(db.credits().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_verdicts_keep_the_order_in_rotation() {
        let db = MemoryLedger::default().with_order("79927398713");
        db.apply_accrual(&number("79927398713"), OrderStatus::Processing, Points::default()).await.unwrap();
        let oracle = ScriptedOracle::new(vec![
            Ok(snapshot("79927398713", AccrualStatus::Registered, None)),
            Ok(snapshot("79927398713", AccrualStatus::Processed, Some(1.0))),
        ]);
        run_to_completion(db.clone(), oracle.clone(), &["79927398713"]).await;

        assert!(oracle.exhausted());
        assert_eq!(db.status_of("79927398713"), OrderStatus::Processed);
    }
}
