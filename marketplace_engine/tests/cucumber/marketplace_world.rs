use cucumber::World;
use log::*;
use marketplace_engine::{
    db_types::{Order, Tracking},
    payment_objects::CompletionResult,
    LifecycleError,
    OrderManagement,
};

use crate::support::Marketplace;

#[derive(Default, Debug, World)]
pub struct MarketplaceWorld {
    pub system: Option<Marketplace>,
    pub order: Option<Order>,
    pub tracking: Option<Tracking>,
    pub completion: Option<CompletionResult>,
    pub error: Option<LifecycleError>,
}

impl MarketplaceWorld {
    pub fn system(&self) -> &Marketplace {
        self.system.as_ref().expect("Marketplace not initialised")
    }

    pub fn order_id(&self) -> i64 {
        self.order.as_ref().expect("No order has been placed").id
    }

    pub fn tracking_id(&self) -> i64 {
        self.tracking.as_ref().expect("The order has not shipped").id
    }

    /// Keeps the error from a step that is allowed to fail, so that a later step can inspect it.
    pub fn record<T>(&mut self, result: Result<T, LifecycleError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.error = None;
                Some(v)
            },
            Err(e) => {
                debug!("🚀️ Step failed as recorded: {e}");
                self.error = Some(e);
                None
            },
        }
    }

    /// The current state of the order, straight from the database.
    pub async fn current_order(&self) -> Order {
        self.system()
            .db
            .fetch_order(self.order_id())
            .await
            .expect("Error fetching order")
            .expect("Order has disappeared")
    }
}

pub fn error_kind(e: &LifecycleError) -> &'static str {
    match e {
        LifecycleError::Validation(_) => "validation",
        LifecycleError::Authorization(_) => "authorization",
        LifecycleError::InvalidTransition { .. } => "invalid_transition",
        LifecycleError::TerminalState(_, _) => "terminal_state",
        LifecycleError::InvalidState { .. } => "invalid_state",
        LifecycleError::ConcurrentModification(_) => "concurrent_modification",
        LifecycleError::OrderNotFound(_) => "order_not_found",
        LifecycleError::TrackingNotFound(_) => "tracking_not_found",
        LifecycleError::Gateway(_) => "gateway",
        LifecycleError::DuplicateTracking(_) => "duplicate_tracking",
        LifecycleError::InvalidTrackingFormat { .. } => "invalid_tracking_format",
        LifecycleError::Unauthorized(_) => "unauthorized",
        LifecycleError::Database(_) => "database",
    }
}
