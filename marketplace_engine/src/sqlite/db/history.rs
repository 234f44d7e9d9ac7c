use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{Actor, OrderStatus, StatusHistoryEntry};

/// Appends an entry to the order's status history. The table rejects updates and deletes.
pub async fn append_entry(
    order_id: i64,
    status: OrderStatus,
    actor: &Actor,
    note: Option<&str>,
    timestamp: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<StatusHistoryEntry, sqlx::Error> {
    let mut rows: Vec<StatusHistoryEntry> = sqlx::query_as(
        r#"
            INSERT INTO order_status_history (order_id, status, timestamp, actor, note)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(status)
    .bind(timestamp)
    .bind(actor.to_string())
    .bind(note)
    .fetch_all(conn)
    .await?;
    rows.pop().ok_or(sqlx::Error::RowNotFound)
}

pub async fn fetch_history(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<StatusHistoryEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
