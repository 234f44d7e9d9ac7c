use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{ReconciliationFlag, ReconciliationStep};

pub async fn insert_flag(
    order_id: i64,
    step: ReconciliationStep,
    message: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ReconciliationFlag, sqlx::Error> {
    let mut rows: Vec<ReconciliationFlag> = sqlx::query_as(
        r#"
            INSERT INTO reconciliation_flags (order_id, step, message, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(step)
    .bind(message)
    .bind(now)
    .fetch_all(conn)
    .await?;
    rows.pop().ok_or(sqlx::Error::RowNotFound)
}

pub async fn fetch_open_flags(conn: &mut SqliteConnection) -> Result<Vec<ReconciliationFlag>, sqlx::Error> {
    let flags = sqlx::query_as("SELECT * FROM reconciliation_flags WHERE resolved = 0 ORDER BY created_at ASC, id ASC")
        .fetch_all(conn)
        .await?;
    Ok(flags)
}

pub async fn fetch_flags_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReconciliationFlag>, sqlx::Error> {
    let flags = sqlx::query_as("SELECT * FROM reconciliation_flags WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(flags)
}

/// Marks the flag resolved. Returns `None` if the flag does not exist.
pub async fn resolve_flag(
    flag_id: i64,
    note: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<ReconciliationFlag>, sqlx::Error> {
    let mut rows: Vec<ReconciliationFlag> = sqlx::query_as(
        r#"
            UPDATE reconciliation_flags SET resolved = 1, resolution_note = $1, resolved_at = $2
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(note)
    .bind(now)
    .bind(flag_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.pop())
}
