use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Order, OrderStatus},
    errors::LifecycleError,
    events::{EventProducers, OrderAnnulledEvent},
    status_machine::validate_transition,
    traits::{OrderManagement, StatusChange},
};

/// The only gate through which an order's status changes.
///
/// Each call validates the move against the transition table and then hands it to the backend, which writes the new
/// status and the history entry atomically and rejects the write if the order changed underneath us.
pub struct TransitionApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for TransitionApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransitionApi")
    }
}

impl<B: Clone> Clone for TransitionApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> TransitionApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn producers(&self) -> &EventProducers {
        &self.producers
    }
}

impl<B> TransitionApi<B>
where B: OrderManagement
{
    /// Applies `change` to the order as it was read.
    ///
    /// Fails with [`LifecycleError::TerminalState`] if the order is already terminal,
    /// [`LifecycleError::InvalidTransition`] if the move is not in the table, and
    /// [`LifecycleError::ConcurrentModification`] if `order` is stale.
    pub async fn apply_transition(&self, order: &Order, change: StatusChange) -> Result<Order, LifecycleError> {
        validate_transition(order.id, order.status, change.target)?;
        if change.target == OrderStatus::Disputed &&
            change.dispute_reason.as_deref().map(|r| r.trim().is_empty()).unwrap_or(true)
        {
            return Err(LifecycleError::Validation("A dispute requires a reason".to_string()));
        }
        let target = change.target;
        let actor = change.actor.to_string();
        let updated = self.db.apply_status_change(order, change).await?;
        info!("🔄️ Order {} [{}] is now {target} ({actor})", updated.id, updated.transaction_id);
        if matches!(
            target,
            OrderStatus::Cancelled | OrderStatus::Refunded | OrderStatus::Returned | OrderStatus::PaymentFailed
        ) {
            debug!("🔄️ Notifying order annulled hook subscribers");
            self.producers.publish_order_annulled(OrderAnnulledEvent::new(updated.clone())).await;
        }
        Ok(updated)
    }

    /// Reads the order fresh and applies `change` to it.
    pub async fn transition_order(&self, order_id: i64, change: StatusChange) -> Result<Order, LifecycleError> {
        let order = self.fetch_order(order_id).await?;
        self.apply_transition(&order, change).await
    }

    pub async fn fetch_order(&self, order_id: i64) -> Result<Order, LifecycleError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| LifecycleError::OrderNotFound(order_id.to_string()))
    }
}
