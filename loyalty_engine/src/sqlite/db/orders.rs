use log::debug;
use lp_common::Points;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderClaim, OrderNumber, OrderStatus},
    traits::LedgerError,
};

/// Inserts the order with `NEW` status, or reports who already claimed the number.
///
/// This is not atomic on its own. Callers embed it in a transaction and pass `&mut *tx` as the connection argument.
pub async fn idempotent_insert(order: NewOrder, conn: &mut SqliteConnection) -> Result<OrderClaim, LedgerError> {
    let claim = match fetch_order_by_number(&order.number, conn).await? {
        Some(existing) if existing.user_id == order.user_id => OrderClaim::AlreadyYours(existing),
        Some(existing) => OrderClaim::ClaimedByOther(existing),
        None => {
            let order = insert_order(order, conn).await?;
            debug!("📝️ Order [{}] inserted with id {}", order.number, order.id);
            OrderClaim::Accepted(order)
        },
    };
    Ok(claim)
}

async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, LedgerError> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (number, user_id, status)
            VALUES ($1, $2, $3)
            RETURNING *;
        "#,
    )
    .bind(order.number)
    .bind(order.user_id)
    .bind(OrderStatus::New)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order_by_number(
    number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE number = $1").bind(number.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// All orders for the user, oldest upload first.
pub async fn fetch_orders_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 ORDER BY uploaded_at ASC, id ASC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

/// Numbers of every order still awaiting a terminal verdict, oldest upload first.
pub async fn fetch_pending_numbers(conn: &mut SqliteConnection) -> Result<Vec<OrderNumber>, sqlx::Error> {
    let numbers: Vec<(OrderNumber,)> = sqlx::query_as(
        r#"
        SELECT number FROM orders
        WHERE status IN ('NEW', 'REGISTERED', 'PROCESSING')
        ORDER BY uploaded_at ASC, id ASC
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(numbers.into_iter().map(|(n,)| n).collect())
}

/// Moves the order to `status` (recording `accrual` with it), but only if the order has not already reached a
/// terminal state and the new status does not regress the lifecycle. Returns `None` when the guard rejects the
/// write, which is how duplicate and out-of-order settlements are absorbed.
///
/// The guard lives in the WHERE clause rather than in a prior SELECT so the check and the write are one statement.
pub(crate) async fn guarded_settle(
    number: &OrderNumber,
    status: OrderStatus,
    accrual: Points,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, LedgerError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET status = $1, accrual = $2, updated_at = CURRENT_TIMESTAMP
        WHERE number = $3
          AND status NOT IN ('PROCESSED', 'INVALID')
          AND (CASE status WHEN 'NEW' THEN 0 WHEN 'REGISTERED' THEN 1 WHEN 'PROCESSING' THEN 2 ELSE 3 END) <= $4
        RETURNING *
        "#,
    )
    .bind(status)
    .bind(accrual)
    .bind(number.as_str())
    .bind(i64::from(status.rank()))
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}
