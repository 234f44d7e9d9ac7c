//! `SqliteDatabase` is a concrete implementation of a lifecycle engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
//!
//! Every write runs inside a `pool.begin()` transaction and is committed before the method returns, so that the change
//! is visible to every other connection in the pool. Each transaction opens with its write statement so that SQLite
//! takes the write lock up front; competing writers wait on the busy timeout and then fail the version check, instead of
//! deadlocking on a read-to-write lock upgrade.
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use mkp_common::Money;
use sqlx::{migrate::MigrateError, SqlitePool};

use super::db::{db_url, fulfillments, history, new_pool, orders, products, reconciliation, trackings, wallet};
use crate::{
    db_types::{
        Actor,
        DeliveryConfirmation,
        FulfillmentRecord,
        FulfillmentStatus,
        NewOrder,
        NewProduct,
        NewTracking,
        NewTrackingEvent,
        Order,
        OrderStatus,
        Product,
        ReconciliationFlag,
        ReconciliationStep,
        StatusHistoryEntry,
        Tracking,
        TrackingEvent,
        WalletCredit,
    },
    errors::LifecycleError,
    traits::{
        CreditOutcome,
        LifecycleDatabase,
        OrderManagement,
        OrderQueryFilter,
        ProductCatalog,
        ReconciliationLog,
        StatusChange,
        TrackingManagement,
        WalletLedger,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

fn order_err(order_id: i64) -> impl Fn(sqlx::Error) -> LifecycleError {
    move |e| LifecycleError::from(e).for_order(order_id)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

impl SqliteDatabase {
    /// Creates a new database API object using the `MKP_DATABASE_URL` environment variable, or the default URL.
    pub async fn new(max_connections: u32) -> Result<Self, LifecycleError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, LifecycleError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Migrations complete");
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), LifecycleError> {
        self.pool.close().await;
        Ok(())
    }
}

impl LifecycleDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, LifecycleError> {
        let now = Utc::now();
        let actor = Actor::Buyer(order.buyer_id.clone());
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, now, &mut tx).await?;
        history::append_entry(order.id, OrderStatus::Pending, &actor, Some("Order created"), now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} [{}] saved for buyer {}", order.id, order.transaction_id, order.buyer_id);
        Ok(order)
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order(id, &mut conn).await?)
    }

    async fn fetch_order_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_transaction_id(transaction_id, &mut conn).await?)
    }

    async fn fetch_order_by_gateway_transaction_id(&self, gateway_txid: &str) -> Result<Option<Order>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_gateway_transaction_id(gateway_txid, &mut conn).await?)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::search_orders(query, &mut conn).await?)
    }

    async fn fetch_status_history(&self, order_id: i64) -> Result<Vec<StatusHistoryEntry>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(history::fetch_history(order_id, &mut conn).await?)
    }

    async fn apply_status_change(&self, order: &Order, change: StatusChange) -> Result<Order, LifecycleError> {
        let now = Utc::now();
        let to_err = order_err(order.id);
        let mut tx = self.pool.begin().await.map_err(&to_err)?;
        let updated = orders::update_status(order, &change, now, &mut tx).await.map_err(&to_err)?;
        let updated = match updated {
            Some(o) => o,
            None => {
                debug!("🗃️ Order {} version {} is stale. Status change to {} rejected", order.id, order.version, change.target);
                return Err(LifecycleError::ConcurrentModification(order.id));
            },
        };
        history::append_entry(order.id, change.target, &change.actor, change.note.as_deref(), now, &mut tx)
            .await
            .map_err(&to_err)?;
        tx.commit().await.map_err(&to_err)?;
        debug!("🗃️ Order {} moved {} -> {} by {}", order.id, order.status, updated.status, change.actor);
        Ok(updated)
    }

    async fn insert_fulfillment(&self, order: &Order) -> Result<(FulfillmentRecord, bool), LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let result = fulfillments::idempotent_insert(order, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_fulfillment(&self, transaction_id: &str) -> Result<Option<FulfillmentRecord>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fulfillments::fetch_by_transaction_id(transaction_id, &mut conn).await?)
    }

    async fn fetch_fulfillments_for_seller(
        &self,
        seller_id: &str,
        status: Option<FulfillmentStatus>,
    ) -> Result<Vec<FulfillmentRecord>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fulfillments::fetch_for_seller(seller_id, status, &mut conn).await?)
    }
}

impl TrackingManagement for SqliteDatabase {
    async fn ship_order(
        &self,
        order: &Order,
        tracking: NewTracking,
        first_event: NewTrackingEvent,
        actor: Actor,
    ) -> Result<(Order, Tracking), LifecycleError> {
        let now = Utc::now();
        let to_err = order_err(order.id);
        let mut tx = self.pool.begin().await.map_err(&to_err)?;
        let tracking = match trackings::insert_tracking(tracking, now, &mut tx).await {
            Ok(t) => t,
            Err(e) if is_unique_violation(&e) => return Err(LifecycleError::DuplicateTracking(order.id)),
            Err(e) => return Err(to_err(e)),
        };
        let change = StatusChange::new(OrderStatus::Shipped, actor)
            .with_note(format!("Shipped with {} ({})", tracking.carrier, tracking.tracking_number));
        let updated = orders::update_status(order, &change, now, &mut tx)
            .await
            .map_err(&to_err)?
            .ok_or(LifecycleError::ConcurrentModification(order.id))?;
        history::append_entry(order.id, change.target, &change.actor, change.note.as_deref(), now, &mut tx)
            .await
            .map_err(&to_err)?;
        trackings::insert_event(tracking.id, &first_event, now, &mut tx).await.map_err(&to_err)?;
        trackings::update_headline_status(tracking.id, first_event.status, now, &mut tx).await.map_err(&to_err)?;
        fulfillments::update_status(order.id, FulfillmentStatus::Shipped, now, &mut tx).await.map_err(&to_err)?;
        let tracking =
            trackings::fetch_tracking(tracking.id, &mut tx).await.map_err(&to_err)?.ok_or(sqlx::Error::RowNotFound)?;
        tx.commit().await.map_err(&to_err)?;
        debug!("🗃️ Order {} shipped. Tracking record {} created", order.id, tracking.id);
        Ok((updated, tracking))
    }

    async fn fetch_tracking(&self, id: i64) -> Result<Option<Tracking>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trackings::fetch_tracking(id, &mut conn).await?)
    }

    async fn fetch_active_tracking_for_order(&self, order_id: i64) -> Result<Option<Tracking>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trackings::fetch_active_tracking_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_latest_tracking_for_order(&self, order_id: i64) -> Result<Option<Tracking>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trackings::fetch_latest_tracking_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_active_tracking_by_number(&self, tracking_number: &str) -> Result<Option<Tracking>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trackings::fetch_active_tracking_by_number(tracking_number, &mut conn).await?)
    }

    async fn fetch_tracking_events(&self, tracking_id: i64) -> Result<Vec<TrackingEvent>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trackings::fetch_events(tracking_id, &mut conn).await?)
    }

    async fn append_tracking_event(
        &self,
        tracking_id: i64,
        event: NewTrackingEvent,
    ) -> Result<(Tracking, TrackingEvent), LifecycleError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let stored = match trackings::insert_event(tracking_id, &event, now, &mut tx).await {
            Ok(e) => e,
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                return Err(LifecycleError::TrackingNotFound(tracking_id.to_string()))
            },
            Err(e) => return Err(e.into()),
        };
        let moved = trackings::update_headline_status(tracking_id, event.status, now, &mut tx).await?;
        let tracking = trackings::fetch_tracking(tracking_id, &mut tx)
            .await?
            .ok_or_else(|| LifecycleError::TrackingNotFound(tracking_id.to_string()))?;
        tx.commit().await?;
        trace!("🗃️ Event '{}' appended to tracking {tracking_id}. Headline moved: {}", stored.description, moved > 0);
        Ok((tracking, stored))
    }

    async fn record_delivery(
        &self,
        tracking_id: i64,
        confirmation: DeliveryConfirmation,
    ) -> Result<(Tracking, bool), LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let result = match trackings::record_delivery(tracking_id, &confirmation, Utc::now(), &mut tx).await? {
            Some(tracking) => (tracking, true),
            None => {
                let existing = trackings::fetch_tracking(tracking_id, &mut tx)
                    .await?
                    .ok_or_else(|| LifecycleError::TrackingNotFound(tracking_id.to_string()))?;
                (existing, false)
            },
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn add_delivery_feedback(
        &self,
        tracking_id: i64,
        feedback: DeliveryConfirmation,
    ) -> Result<Tracking, LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let tracking = trackings::add_delivery_feedback(tracking_id, &feedback, Utc::now(), &mut tx)
            .await?
            .ok_or_else(|| LifecycleError::TrackingNotFound(tracking_id.to_string()))?;
        tx.commit().await?;
        Ok(tracking)
    }

    async fn deactivate_tracking(&self, tracking_id: i64, reason: &str) -> Result<Tracking, LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let tracking = trackings::deactivate(tracking_id, reason, Utc::now(), &mut tx)
            .await?
            .ok_or_else(|| LifecycleError::TrackingNotFound(tracking_id.to_string()))?;
        tx.commit().await?;
        debug!("🗃️ Tracking {tracking_id} deactivated: {reason}");
        Ok(tracking)
    }

    async fn fetch_trackings_to_sync(&self) -> Result<Vec<Tracking>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trackings::fetch_trackings_to_sync(&mut conn).await?)
    }

    async fn mark_tracking_synced(&self, tracking_id: i64) -> Result<(), LifecycleError> {
        let mut tx = self.pool.begin().await?;
        trackings::mark_synced(tracking_id, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

impl ProductCatalog for SqliteDatabase {
    async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(products::fetch_product(product_id, &mut conn).await?)
    }

    async fn upsert_product(&self, product: NewProduct) -> Result<Product, LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let product = products::upsert_product(product, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn mark_product_sold(&self, product_id: &str) -> Result<bool, LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let changed = products::mark_sold(product_id, Utc::now(), &mut tx).await?;
        if changed > 0 {
            tx.commit().await?;
            return Ok(true);
        }
        let existing = products::fetch_product(product_id, &mut tx).await?;
        tx.commit().await?;
        match existing {
            Some(_) => Ok(false),
            None => Err(LifecycleError::Validation(format!("Product {product_id} does not exist"))),
        }
    }
}

impl WalletLedger for SqliteDatabase {
    async fn credit_wallet(
        &self,
        user_id: &str,
        amount: Money,
        currency: &str,
        reason: &str,
        order_id: i64,
    ) -> Result<CreditOutcome, LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let outcome = match wallet::insert_credit(user_id, amount, currency, reason, order_id, Utc::now(), &mut tx).await? {
            Some(credit) => CreditOutcome::Credited(credit),
            None => {
                let existing = wallet::fetch_credit_for_order(order_id, &mut tx)
                    .await?
                    .ok_or(LifecycleError::ConcurrentModification(order_id))?;
                CreditOutcome::AlreadyCredited(existing)
            },
        };
        tx.commit().await?;
        if matches!(outcome, CreditOutcome::Credited(_)) {
            debug!("🗃️ Wallet of {user_id} credited {amount} {currency} for order {order_id}");
        }
        Ok(outcome)
    }

    async fn fetch_credit_for_order(&self, order_id: i64) -> Result<Option<WalletCredit>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(wallet::fetch_credit_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_wallet_credits(&self, user_id: &str) -> Result<Vec<WalletCredit>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(wallet::fetch_credits_for_user(user_id, &mut conn).await?)
    }
}

impl ReconciliationLog for SqliteDatabase {
    async fn flag_for_reconciliation(
        &self,
        order_id: i64,
        step: ReconciliationStep,
        message: &str,
    ) -> Result<ReconciliationFlag, LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let flag = reconciliation::insert_flag(order_id, step, message, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(flag)
    }

    async fn fetch_open_flags(&self) -> Result<Vec<ReconciliationFlag>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reconciliation::fetch_open_flags(&mut conn).await?)
    }

    async fn fetch_flags_for_order(&self, order_id: i64) -> Result<Vec<ReconciliationFlag>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reconciliation::fetch_flags_for_order(order_id, &mut conn).await?)
    }

    async fn resolve_flag(&self, flag_id: i64, note: &str) -> Result<ReconciliationFlag, LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let flag = reconciliation::resolve_flag(flag_id, note, Utc::now(), &mut tx)
            .await?
            .ok_or_else(|| LifecycleError::Validation(format!("Reconciliation flag {flag_id} does not exist")))?;
        tx.commit().await?;
        Ok(flag)
    }
}
