use chrono::{DateTime, Utc};
use mkp_common::Money;
use sqlx::SqliteConnection;

use crate::db_types::WalletCredit;

/// Inserts a credit entry for the order. The unique index on `order_id` guarantees at most one entry per order; a
/// second attempt returns `None`.
pub async fn insert_credit(
    user_id: &str,
    amount: Money,
    currency: &str,
    reason: &str,
    order_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<WalletCredit>, sqlx::Error> {
    let mut rows: Vec<WalletCredit> = sqlx::query_as(
        r#"
            INSERT INTO wallet_credits (user_id, order_id, amount, currency, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(order_id)
    .bind(amount)
    .bind(currency)
    .bind(reason)
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(rows.pop())
}

pub async fn fetch_credit_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<WalletCredit>, sqlx::Error> {
    let credit = sqlx::query_as("SELECT * FROM wallet_credits WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(credit)
}

pub async fn fetch_credits_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<WalletCredit>, sqlx::Error> {
    let credits = sqlx::query_as("SELECT * FROM wallet_credits WHERE user_id = $1 ORDER BY id ASC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(credits)
}
