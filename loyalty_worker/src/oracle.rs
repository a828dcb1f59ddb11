//! Client for the external accrual oracle.
//!
//! The oracle is asked `GET {base}/api/orders/{number}` and answers with a JSON body
//! `{"order": "...", "status": "...", "accrual": 729.98}`. It is a shared, globally rate-limited resource: a 429
//! response carries a `Retry-After` duration that applies to *all* polling, not just the order that triggered it,
//! which is why the cooldown travels inside [`OracleError::RateLimited`] rather than in any shared state.

use std::{future::Future, sync::Arc, time::Duration};

use log::trace;
use loyalty_engine::db_types::{OrderNumber, OrderStatus};
use lp_common::Points;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// What the oracle knows about one order at one moment.
#[derive(Debug, Clone, Deserialize)]
pub struct AccrualSnapshot {
    pub order: String,
    pub status: AccrualStatus,
    /// Only meaningful when `status` is `Processed`.
    #[serde(default)]
    pub accrual: Option<Points>,
}

/// The oracle's own status vocabulary. Mapped onto the ledger lifecycle explicitly — the oracle never reports
/// `NEW`, since an order it has never heard of is a 204, not a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Processed,
    Invalid,
}

impl AccrualStatus {
    pub fn as_order_status(self) -> OrderStatus {
        match self {
            AccrualStatus::Registered => OrderStatus::Registered,
            AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Processed => OrderStatus::Processed,
            AccrualStatus::Invalid => OrderStatus::Invalid,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// The oracle asked every caller to back off. The duration covers all polling, not just this order.
    #[error("The accrual service is rate limited. Retry in {0:?}")]
    RateLimited(Duration),
    /// The oracle has not registered this order yet. Poll again later.
    #[error("Order [{0}] is not known to the accrual service yet")]
    NotReady(OrderNumber),
    /// Transport failure, server error or an unreadable body. Safe to retry.
    #[error("Transient accrual service failure: {0}")]
    Transient(String),
    /// The oracle answered for a different order than the one requested. Never retried, never applied.
    #[error("Asked the accrual service about order [{asked}] but it answered for [{answered}]")]
    OrderMismatch { asked: OrderNumber, answered: String },
    /// A credit can never be negative. Never retried, never applied.
    #[error("The accrual service returned a negative accrual ({accrual}) for order [{order}]")]
    NegativeAccrual { order: OrderNumber, accrual: Points },
}

impl OracleError {
    /// Hard errors are structurally wrong responses: retrying cannot change them, so the work item is dropped.
    pub fn is_hard(&self) -> bool {
        matches!(self, OracleError::OrderMismatch { .. } | OracleError::NegativeAccrual { .. })
    }
}

/// The oracle as the worker sees it. The HTTP implementation lives in [`HttpAccrualOracle`]; tests script their
/// own. Declared as `impl Future + Send` so the reconciler can be spawned with the oracle still generic;
/// implementations can use plain `async fn`.
pub trait AccrualOracle: Clone + Send + Sync {
    fn fetch(&self, number: &OrderNumber) -> impl Future<Output = Result<AccrualSnapshot, OracleError>> + Send;
}

#[derive(Clone)]
pub struct HttpAccrualOracle {
    base_url: String,
    client: Arc<Client>,
}

impl HttpAccrualOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| OracleError::Transient(e.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self { base_url, client: Arc::new(client) })
    }

    fn url_for(&self, number: &OrderNumber) -> String {
        format!("{}/api/orders/{number}", self.base_url)
    }
}

impl AccrualOracle for HttpAccrualOracle {
    async fn fetch(&self, number: &OrderNumber) -> Result<AccrualSnapshot, OracleError> {
        let url = self.url_for(number);
        trace!("🔮️ Polling accrual oracle: {url}");
        let response = self.client.get(&url).send().await.map_err(|e| OracleError::Transient(e.to_string()))?;
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let pause = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .ok_or_else(|| {
                        OracleError::Transient("429 response without a readable Retry-After header".to_string())
                    })?;
                Err(OracleError::RateLimited(pause))
            },
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Err(OracleError::NotReady(number.clone())),
            status if status.is_success() => {
                let snapshot: AccrualSnapshot =
                    response.json().await.map_err(|e| OracleError::Transient(e.to_string()))?;
                validate(number, snapshot)
            },
            status => Err(OracleError::Transient(format!("accrual service answered {status} for {url}"))),
        }
    }
}

/// Rejects structurally wrong responses before they get anywhere near the ledger.
fn validate(asked: &OrderNumber, snapshot: AccrualSnapshot) -> Result<AccrualSnapshot, OracleError> {
    if snapshot.order != asked.as_str() {
        return Err(OracleError::OrderMismatch { asked: asked.clone(), answered: snapshot.order });
    }
    if let Some(accrual) = snapshot.accrual {
        if accrual.is_negative() {
            return Err(OracleError::NegativeAccrual { order: asked.clone(), accrual });
        }
    }
    Ok(snapshot)
}

#[cfg(test)]
mod test {
    use super::*;

    fn number(s: &str) -> OrderNumber {
        s.parse().unwrap()
    }

    #[test]
    fn snapshot_decodes_the_oracle_vocabulary() {
        let snapshot: AccrualSnapshot =
            serde_json::from_str(r#"{"order": "79927398713", "status": "PROCESSED", "accrual": 500}"#).unwrap();
        assert_eq!(snapshot.order, "79927398713");
        assert_eq!(snapshot.status, AccrualStatus::Processed);
        assert_eq!(snapshot.accrual, Some(Points::from_points(500)));

        let snapshot: AccrualSnapshot =
            serde_json::from_str(r#"{"order": "79927398713", "status": "REGISTERED"}"#).unwrap();
        assert_eq!(snapshot.status, AccrualStatus::Registered);
        assert_eq!(snapshot.accrual, None);
    }

    #[test]
    fn every_oracle_status_maps_onto_the_lifecycle() {
        assert_eq!(AccrualStatus::Registered.as_order_status(), OrderStatus::Registered);
        assert_eq!(AccrualStatus::Processing.as_order_status(), OrderStatus::Processing);
        assert_eq!(AccrualStatus::Processed.as_order_status(), OrderStatus::Processed);
        assert_eq!(AccrualStatus::Invalid.as_order_status(), OrderStatus::Invalid);
    }

    #[test]
    fn mismatched_answers_are_hard_errors() {
        let snapshot: AccrualSnapshot =
            serde_json::from_str(r#"{"order": "49927398716", "status": "PROCESSED", "accrual": 500}"#).unwrap();
        let err = validate(&number("79927398713"), snapshot).unwrap_err();
        assert!(err.is_hard());

        let snapshot: AccrualSnapshot =
            serde_json::from_str(r#"{"order": "79927398713", "status": "PROCESSED", "accrual": -5}"#).unwrap();
        let err = validate(&number("79927398713"), snapshot).unwrap_err();
        assert!(err.is_hard());

        assert!(!OracleError::Transient("boom".to_string()).is_hard());
        assert!(!OracleError::RateLimited(Duration::from_secs(5)).is_hard());
    }
}
