use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::debug;
use lp_common::Points;
use serde::Serialize;

use crate::{
    db_types::{NewOrder, Order, OrderClaim, OrderNumber, OrderStatus},
    traits::{LedgerDatabase, LedgerError},
};

/// The `OrderApi` handles order submission and order-history queries on behalf of the HTTP layer.
pub struct OrderApi<B> {
    db: B,
}

impl<B: Debug> Debug for OrderApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderApi ({:?})", self.db)
    }
}

impl<B> OrderApi<B>
where B: LedgerDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Submits an order number on behalf of a user.
    ///
    /// The caller is responsible for enqueueing the number onto the work queue when the claim is
    /// [`OrderClaim::Accepted`]; the ledger itself knows nothing about the queue.
    pub async fn submit_order(&self, user_id: &str, number: OrderNumber) -> Result<OrderClaim, LedgerError> {
        let claim = self.db.submit_order(NewOrder::new(number, user_id)).await?;
        match &claim {
            OrderClaim::Accepted(order) => debug!("📦️ Order [{}] accepted for user {user_id}", order.number),
            OrderClaim::AlreadyYours(order) => debug!("📦️ Order [{}] resubmitted by its owner", order.number),
            OrderClaim::ClaimedByOther(order) => {
                debug!("📦️ Order [{}] rejected: claimed by another user", order.number)
            },
        }
        Ok(claim)
    }

    /// The user's order history, oldest first, in the wire shape.
    pub async fn orders_for_user(&self, user_id: &str) -> Result<Vec<OrderSummary>, LedgerError> {
        let orders = self.db.orders_for_user(user_id).await?;
        Ok(orders.into_iter().map(OrderSummary::from).collect())
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

/// User-facing view of an order row.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub number: OrderNumber,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Points>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderSummary {
    fn from(order: Order) -> Self {
        let accrual = match order.status {
            OrderStatus::Processed => Some(order.accrual),
            _ => None,
        };
        Self { number: order.number, status: order.status, accrual, uploaded_at: order.uploaded_at }
    }
}
