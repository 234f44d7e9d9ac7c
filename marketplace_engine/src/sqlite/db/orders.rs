use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderStatus},
    traits::{OrderQueryFilter, StatusChange},
};

/// Inserts a new order in the `pending` state. This is not atomic. Embed the call in a transaction together with the
/// first history entry.
pub async fn insert_order(order: NewOrder, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let a = &order.amounts;
    let s = &order.shipping_address;
    let mut rows: Vec<Order> = sqlx::query_as(
        r#"
            INSERT INTO orders (
                transaction_id, buyer_id, seller_id, product_id, payment_method, gateway,
                product_price, shipping_cost, sales_tax, platform_fee, gateway_fee, total_amount, seller_payout,
                fee_payer, currency, status,
                shipping_name, shipping_line1, shipping_line2, shipping_city, shipping_region, shipping_postal_code,
                shipping_country, shipping_phone,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16,
                $17, $18, $19, $20, $21, $22,
                $23, $24,
                $25, $25
            )
            RETURNING *;
        "#,
    )
    .bind(&order.transaction_id)
    .bind(&order.buyer_id)
    .bind(&order.seller_id)
    .bind(&order.product_id)
    .bind(order.payment_method)
    .bind(order.gateway)
    .bind(a.product_price)
    .bind(a.shipping_cost)
    .bind(a.sales_tax)
    .bind(a.platform_fee)
    .bind(a.gateway_fee)
    .bind(a.total_amount)
    .bind(a.seller_payout)
    .bind(a.fee_payer)
    .bind(&a.currency)
    .bind(OrderStatus::Pending)
    .bind(&s.full_name)
    .bind(&s.line1)
    .bind(&s.line2)
    .bind(&s.city)
    .bind(&s.region)
    .bind(&s.postal_code)
    .bind(&s.country)
    .bind(&s.phone)
    .bind(now)
    .fetch_all(conn)
    .await?;
    rows.pop().ok_or(sqlx::Error::RowNotFound)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_transaction_id(
    transaction_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_gateway_transaction_id(
    gateway_txid: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE gateway_transaction_id = $1")
        .bind(gateway_txid)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(buyer_id) = query.buyer_id {
        where_clause.push("buyer_id = ");
        where_clause.push_bind_unseparated(buyer_id);
    }
    if let Some(seller_id) = query.seller_id {
        where_clause.push("seller_id = ");
        where_clause.push_bind_unseparated(seller_id);
    }
    if let Some(user) = query.participant_id {
        where_clause.push("(buyer_id = ");
        where_clause.push_bind_unseparated(user.clone());
        where_clause.push_unseparated(" OR seller_id = ");
        where_clause.push_bind_unseparated(user);
        where_clause.push_unseparated(")");
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        for (i, status) in statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if let Some(cutoff) = query.delivered_before {
        where_clause.push("delivered_at IS NOT NULL AND delivered_at < ");
        where_clause.push_bind_unseparated(cutoff);
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC, id ASC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {}", orders.len());
    Ok(orders)
}

/// Applies the status change if, and only if, the row still has the version in `order`.
///
/// Returns `None` when the version check (or the completion-flag check) fails, meaning someone else got there first.
pub async fn update_status(
    order: &Order,
    change: &StatusChange,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let mut rows: Vec<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                version = version + 1,
                updated_at = $2,
                payment_completed = CASE WHEN $3 THEN 1 ELSE payment_completed END,
                gateway_transaction_id = COALESCE($4, gateway_transaction_id),
                gateway_response = COALESCE($5, gateway_response),
                dispute_reason = COALESCE($6, dispute_reason),
                dispute_raised_at = CASE WHEN $6 IS NOT NULL THEN $2 ELSE dispute_raised_at END,
                delivered_at = CASE WHEN $1 = 'delivered' THEN $2 ELSE delivered_at END
            WHERE id = $7 AND version = $8 AND (NOT $3 OR payment_completed = 0)
            RETURNING *;
        "#,
    )
    .bind(change.target)
    .bind(now)
    .bind(change.completes_payment)
    .bind(&change.gateway_transaction_id)
    .bind(&change.gateway_response)
    .bind(&change.dispute_reason)
    .bind(order.id)
    .bind(order.version)
    .fetch_all(conn)
    .await?;
    Ok(rows.pop())
}
