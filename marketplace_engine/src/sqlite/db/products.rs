use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{NewProduct, Product};

pub async fn fetch_product(id: &str, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product = sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(product)
}

pub async fn upsert_product(
    product: NewProduct,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Product, sqlx::Error> {
    let mut rows: Vec<Product> = sqlx::query_as(
        r#"
            INSERT INTO products (id, seller_id, title, price, shipping_cost, currency, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                seller_id = excluded.seller_id,
                title = excluded.title,
                price = excluded.price,
                shipping_cost = excluded.shipping_cost,
                currency = excluded.currency,
                status = excluded.status,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(product.id)
    .bind(product.seller_id)
    .bind(product.title)
    .bind(product.price)
    .bind(product.shipping_cost)
    .bind(product.currency)
    .bind(product.status)
    .bind(now)
    .fetch_all(conn)
    .await?;
    rows.pop().ok_or(sqlx::Error::RowNotFound)
}

/// Check-then-set in a single statement. Returns the number of rows changed: 0 means it was already sold (or does not
/// exist).
pub async fn mark_sold(id: &str, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE products SET status = 'sold', updated_at = $1 WHERE id = $2 AND status <> 'sold'")
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
