//! End-to-end worker flow against a real ledger: sweep, poll, settle, credit.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use loyalty_engine::{
    db_types::{NewOrder, OrderNumber, OrderStatus},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    LedgerDatabase,
    SqliteDatabase,
};
use loyalty_worker::{
    oracle::{AccrualOracle, AccrualSnapshot, AccrualStatus, OracleError},
    queue::work_queue,
    reconciler::Reconciler,
    sweep::recovery_sweep,
};
use lp_common::Points;

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
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| Err(OracleError::NotReady(number.clone())))
    }
}

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn number(s: &str) -> OrderNumber {
    s.parse().expect("test order number must be Luhn-valid")
}

fn snapshot(order: &str, status: AccrualStatus, accrual: Option<f64>) -> Result<AccrualSnapshot, OracleError> {
    Ok(AccrualSnapshot { order: order.to_string(), status, accrual: accrual.map(|a| Points::try_from(a).unwrap()) })
}

/// Sweeps the ledger into a fresh queue and runs the worker until the oracle script is spent.
async fn sweep_and_run(db: &SqliteDatabase, oracle: ScriptedOracle) {
    let (handle, queue) = work_queue();
    let requeue = handle.downgrade();
    recovery_sweep(db, &handle).await.unwrap();

    let watch = oracle.clone();
    tokio::spawn(async move {
        while !watch.exhausted() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        drop(handle);
    });
    Reconciler::new(db.clone(), oracle, queue, requeue, Duration::from_millis(20)).run().await;
}

#[tokio::test]
async fn a_restart_resumes_pending_orders_and_credits_exactly_once() {
    let db = new_db().await;
    db.submit_order(NewOrder::new(number("79927398713"), "alice")).await.unwrap();
    db.submit_order(NewOrder::new(number("49927398716"), "alice")).await.unwrap();

    // First run: one order settles, the other is still cooking when the service stops.
    let oracle = ScriptedOracle::new(vec![
        snapshot("79927398713", AccrualStatus::Processed, Some(729.98)),
        snapshot("49927398716", AccrualStatus::Processing, None),
        snapshot("49927398716", AccrualStatus::Processing, None),
    ]);
    sweep_and_run(&db, oracle).await;

    assert_eq!(db.fetch_order(&number("79927398713")).await.unwrap().unwrap().status, OrderStatus::Processed);
    assert_eq!(db.fetch_order(&number("49927398716")).await.unwrap().unwrap().status, OrderStatus::Processing);

    // Second run: the sweep re-feeds the unfinished order and leaves the settled one alone.
    let oracle = ScriptedOracle::new(vec![snapshot("49927398716", AccrualStatus::Processed, Some(100.0))]);
    sweep_and_run(&db, oracle).await;

    assert_eq!(db.fetch_order(&number("49927398716")).await.unwrap().unwrap().status, OrderStatus::Processed);
    let balance = db.balance("alice").await.unwrap();
    assert_eq!(balance.current, Points::try_from(829.98).unwrap());
}

#[tokio::test]
async fn invalid_orders_settle_without_credit() {
    let db = new_db().await;
    db.submit_order(NewOrder::new(number("12345678903"), "bob")).await.unwrap();

    let oracle = ScriptedOracle::new(vec![snapshot("12345678903", AccrualStatus::Invalid, None)]);
    sweep_and_run(&db, oracle).await;

    let order = db.fetch_order(&number("12345678903")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Invalid);
    assert_eq!(order.accrual, Points::default());
    assert_eq!(db.balance("bob").await.unwrap().current, Points::default());
}
