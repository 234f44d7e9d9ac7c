use std::time::Duration as StdDuration;

use chrono::Duration;
use log::*;
use marketplace_engine::{
    db_types::Order,
    events::EventProducers,
    integrations::ConfiguredCarrier,
    SqliteDatabase,
    TrackingApi,
};
use tokio::task::JoinHandle;

/// Starts the tracking worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval` the worker polls the carrier for each active shipment, and then completes orders that have been
/// `delivered` for longer than `auto_complete_after` without a buyer confirmation.
///
/// The job runs on the server's local task set, alongside the request handlers.
pub fn start_tracking_worker(
    db: SqliteDatabase,
    carrier: ConfiguredCarrier,
    producers: EventProducers,
    interval: StdDuration,
    auto_complete_after: Duration,
) -> JoinHandle<()> {
    actix_web::rt::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = TrackingApi::new(db, carrier, producers);
        info!("🕰️ Tracking worker started. Syncing every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            debug!("🕰️ Running tracking sync job");
            match api.sync_all().await {
                Ok(summary) => {
                    info!(
                        "🕰️ {} shipments synced, {} new events, {} failed",
                        summary.synced, summary.new_events, summary.failed
                    );
                },
                Err(e) => {
                    error!("🕰️ Error running tracking sync job: {e}");
                },
            }
            match api.auto_complete_delivered(auto_complete_after).await {
                Ok(orders) if orders.is_empty() => trace!("🕰️ No delivered orders are due for completion"),
                Ok(orders) => info!("🕰️ {} orders auto-completed: {}", orders.len(), order_list(&orders)),
                Err(e) => {
                    error!("🕰️ Error running auto-completion job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] buyer: {} seller: {}", o.id, o.buyer_id, o.seller_id))
        .collect::<Vec<String>>()
        .join(", ")
}
