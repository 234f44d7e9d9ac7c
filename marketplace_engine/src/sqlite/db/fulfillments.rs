use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::db_types::{FulfillmentRecord, FulfillmentStatus, Order};

/// Creates the fulfillment record for the order unless one already exists for its `transaction_id`.
/// Returns `false` in the second field if the record was already there.
pub async fn idempotent_insert(
    order: &Order,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(FulfillmentRecord, bool), sqlx::Error> {
    let s = &order.shipping_address;
    let mut rows: Vec<FulfillmentRecord> = sqlx::query_as(
        r#"
            INSERT INTO fulfillments (
                order_id, transaction_id, buyer_id, seller_id, product_id,
                shipping_name, shipping_line1, shipping_line2, shipping_city, shipping_region, shipping_postal_code,
                shipping_country, shipping_phone, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(order.id)
    .bind(&order.transaction_id)
    .bind(&order.buyer_id)
    .bind(&order.seller_id)
    .bind(&order.product_id)
    .bind(&s.full_name)
    .bind(&s.line1)
    .bind(&s.line2)
    .bind(&s.city)
    .bind(&s.region)
    .bind(&s.postal_code)
    .bind(&s.country)
    .bind(&s.phone)
    .bind(FulfillmentStatus::AwaitingShipment)
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;
    match rows.pop() {
        Some(record) => {
            debug!("🗃️ Fulfillment record created for [{}]", order.transaction_id);
            Ok((record, true))
        },
        None => {
            let existing = fetch_by_transaction_id(&order.transaction_id, conn).await?.ok_or(sqlx::Error::RowNotFound)?;
            Ok((existing, false))
        },
    }
}

pub async fn fetch_by_transaction_id(
    transaction_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<FulfillmentRecord>, sqlx::Error> {
    let record = sqlx::query_as("SELECT * FROM fulfillments WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

pub async fn update_status(
    order_id: i64,
    status: FulfillmentStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE fulfillments SET status = $1, updated_at = $2 WHERE order_id = $3")
        .bind(status)
        .bind(now)
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn fetch_for_seller(
    seller_id: &str,
    status: Option<FulfillmentStatus>,
    conn: &mut SqliteConnection,
) -> Result<Vec<FulfillmentRecord>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM fulfillments WHERE seller_id = ");
    builder.push_bind(seller_id.to_string());
    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    builder.push(" ORDER BY created_at ASC, id ASC");
    let records = builder.build_query_as::<FulfillmentRecord>().fetch_all(conn).await?;
    Ok(records)
}
