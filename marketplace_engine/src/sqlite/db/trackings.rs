use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{DeliveryConfirmation, NewTracking, NewTrackingEvent, Tracking, TrackingEvent, TrackingStatus};

/// Inserts a new, active, tracking record. The partial unique index on `(order_id) WHERE is_active` rejects a second
/// active record for the same order.
pub async fn insert_tracking(
    tracking: NewTracking,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Tracking, sqlx::Error> {
    let mut rows: Vec<Tracking> = sqlx::query_as(
        r#"
            INSERT INTO trackings (
                order_id, carrier, tracking_number, tracking_url, status, estimated_delivery, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(tracking.order_id)
    .bind(tracking.carrier)
    .bind(tracking.tracking_number)
    .bind(tracking.tracking_url)
    .bind(TrackingStatus::Pending)
    .bind(tracking.estimated_delivery)
    .bind(now)
    .fetch_all(conn)
    .await?;
    rows.pop().ok_or(sqlx::Error::RowNotFound)
}

pub async fn insert_event(
    tracking_id: i64,
    event: &NewTrackingEvent,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<TrackingEvent, sqlx::Error> {
    let mut rows: Vec<TrackingEvent> = sqlx::query_as(
        r#"
            INSERT INTO tracking_events (tracking_id, timestamp, status, description, location, source, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(tracking_id)
    .bind(event.timestamp)
    .bind(event.status)
    .bind(&event.description)
    .bind(&event.location)
    .bind(event.source)
    .bind(now)
    .fetch_all(conn)
    .await?;
    rows.pop().ok_or(sqlx::Error::RowNotFound)
}

/// Moves the headline status, except once it has reached `delivered`.
pub async fn update_headline_status(
    tracking_id: i64,
    status: TrackingStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE trackings SET status = $1, updated_at = $2 WHERE id = $3 AND status <> 'delivered' AND status <> $1",
    )
    .bind(status)
    .bind(now)
    .bind(tracking_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn fetch_tracking(id: i64, conn: &mut SqliteConnection) -> Result<Option<Tracking>, sqlx::Error> {
    let tracking = sqlx::query_as("SELECT * FROM trackings WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(tracking)
}

pub async fn fetch_active_tracking_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Tracking>, sqlx::Error> {
    let tracking = sqlx::query_as("SELECT * FROM trackings WHERE order_id = $1 AND is_active = 1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(tracking)
}

pub async fn fetch_latest_tracking_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Tracking>, sqlx::Error> {
    let tracking = sqlx::query_as("SELECT * FROM trackings WHERE order_id = $1 ORDER BY is_active DESC, id DESC LIMIT 1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(tracking)
}

pub async fn fetch_active_tracking_by_number(
    tracking_number: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Tracking>, sqlx::Error> {
    let tracking = sqlx::query_as(
        "SELECT * FROM trackings WHERE tracking_number = $1 AND is_active = 1 ORDER BY id DESC LIMIT 1",
    )
    .bind(tracking_number)
    .fetch_optional(conn)
    .await?;
    Ok(tracking)
}

pub async fn fetch_events(tracking_id: i64, conn: &mut SqliteConnection) -> Result<Vec<TrackingEvent>, sqlx::Error> {
    let events = sqlx::query_as("SELECT * FROM tracking_events WHERE tracking_id = $1 ORDER BY timestamp ASC, id ASC")
        .bind(tracking_id)
        .fetch_all(conn)
        .await?;
    Ok(events)
}

/// Sets the delivery confirmation, unless one has already been recorded. Returns the updated record only if this call
/// made the change.
pub async fn record_delivery(
    tracking_id: i64,
    confirmation: &DeliveryConfirmation,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Tracking>, sqlx::Error> {
    let mut rows: Vec<Tracking> = sqlx::query_as(
        r#"
            UPDATE trackings SET
                is_delivered = 1,
                status = 'delivered',
                delivered_at = COALESCE($1, $2),
                confirmed_by = $3,
                rating = $4,
                feedback = $5,
                delivery_proof = $6,
                updated_at = $2
            WHERE id = $7 AND is_delivered = 0
            RETURNING *;
        "#,
    )
    .bind(confirmation.delivered_at)
    .bind(now)
    .bind(confirmation.confirmed_by)
    .bind(confirmation.rating)
    .bind(&confirmation.feedback)
    .bind(&confirmation.delivery_proof)
    .bind(tracking_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.pop())
}

/// Fills in buyer feedback on a delivery that was confirmed by someone else. Existing values are kept.
pub async fn add_delivery_feedback(
    tracking_id: i64,
    confirmation: &DeliveryConfirmation,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Tracking>, sqlx::Error> {
    let mut rows: Vec<Tracking> = sqlx::query_as(
        r#"
            UPDATE trackings SET
                rating = COALESCE(rating, $1),
                feedback = COALESCE(feedback, $2),
                delivery_proof = COALESCE(delivery_proof, $3),
                updated_at = $4
            WHERE id = $5
            RETURNING *;
        "#,
    )
    .bind(confirmation.rating)
    .bind(&confirmation.feedback)
    .bind(&confirmation.delivery_proof)
    .bind(now)
    .bind(tracking_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.pop())
}

pub async fn deactivate(
    tracking_id: i64,
    reason: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Tracking>, sqlx::Error> {
    let mut rows: Vec<Tracking> = sqlx::query_as(
        "UPDATE trackings SET is_active = 0, deactivation_reason = $1, updated_at = $2 WHERE id = $3 RETURNING *",
    )
    .bind(reason)
    .bind(now)
    .bind(tracking_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.pop())
}

pub async fn fetch_trackings_to_sync(conn: &mut SqliteConnection) -> Result<Vec<Tracking>, sqlx::Error> {
    let trackings =
        sqlx::query_as("SELECT * FROM trackings WHERE is_active = 1 AND is_delivered = 0 ORDER BY last_synced_at ASC")
            .fetch_all(conn)
            .await?;
    Ok(trackings)
}

pub async fn mark_synced(tracking_id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE trackings SET last_synced_at = $1 WHERE id = $2").bind(now).bind(tracking_id).execute(conn).await?;
    Ok(())
}
