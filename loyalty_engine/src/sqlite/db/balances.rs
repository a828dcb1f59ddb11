use log::debug;
use lp_common::Points;
use sqlx::SqliteConnection;

use crate::{db_types::BalanceSummary, traits::LedgerError};

/// Creates the zero balance row for the user if it does not exist yet.
pub async fn ensure_account(user_id: &str, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query("INSERT INTO balances (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_balance(user_id: &str, conn: &mut SqliteConnection) -> Result<Option<BalanceSummary>, LedgerError> {
    let summary = sqlx::query_as("SELECT current, withdrawn FROM balances WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(summary)
}

/// Adds `amount` to the user's spendable balance. The caller's transaction must also contain the order settlement
/// that explains the credit.
pub async fn credit(user_id: &str, amount: Points, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    ensure_account(user_id, &mut *conn).await?;
    let value = amount.value();
    sqlx::query(
        r#"UPDATE balances SET
           current = current + $1,
           updated_at = CURRENT_TIMESTAMP
           WHERE user_id = $2
           "#,
    )
    .bind(value)
    .bind(user_id)
    .execute(conn)
    .await?;
    debug!("🗃️ Credited {amount} points to user {user_id}");
    Ok(())
}

/// Moves `amount` from `current` to `withdrawn`, but only if the balance covers it. The balance check and the
/// debit are one conditional statement, so two concurrent debits can never both spend the same points. Returns
/// false when the guard rejects the debit.
pub async fn try_debit(user_id: &str, amount: Points, conn: &mut SqliteConnection) -> Result<bool, LedgerError> {
    let value = amount.value();
    let result = sqlx::query(
        r#"UPDATE balances SET
           current = current - $1,
           withdrawn = withdrawn + $1,
           updated_at = CURRENT_TIMESTAMP
           WHERE user_id = $2 AND current >= $1
           "#,
    )
    .bind(value)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
