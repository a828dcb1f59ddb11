use lp_common::Points;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderNumber, Withdrawal},
    traits::LedgerError,
};

/// Appends a row to the withdrawal log. The caller's transaction must also contain the matching balance debit.
pub async fn insert_withdrawal(
    user_id: &str,
    number: &OrderNumber,
    amount: Points,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, LedgerError> {
    let withdrawal = sqlx::query_as(
        r#"
        INSERT INTO withdrawals (user_id, number, amount)
        VALUES ($1, $2, $3)
        RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(number.as_str())
    .bind(amount)
    .fetch_one(conn)
    .await?;
    Ok(withdrawal)
}

/// All withdrawals for the user, oldest first.
pub async fn fetch_withdrawals_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Withdrawal>, LedgerError> {
    let withdrawals =
        sqlx::query_as("SELECT * FROM withdrawals WHERE user_id = $1 ORDER BY processed_at ASC, id ASC")
            .bind(user_id)
            .fetch_all(conn)
            .await?;
    Ok(withdrawals)
}
