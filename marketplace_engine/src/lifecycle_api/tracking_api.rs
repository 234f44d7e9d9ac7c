use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{
        Actor,
        DeliveryConfirmation,
        DeliveryConfirmer,
        EventSource,
        NewTracking,
        NewTrackingEvent,
        Order,
        OrderStatus,
        Tracking,
        TrackingEvent,
        TrackingStatus,
    },
    errors::LifecycleError,
    events::{EventProducers, OrderDeliveredEvent, OrderShippedEvent},
    helpers::{canonical_tracking_number, is_valid_tracking_number, normalize_carrier},
    integrations::CarrierClient,
    lifecycle_api::{
        order_objects::{ensure_buyer, ensure_participant, ensure_seller},
        tracking_objects::{
            CarrierUpdate,
            ConfirmDeliveryRequest,
            ManualTrackingUpdate,
            ShipOrderRequest,
            SyncSummary,
            TrackingDetails,
            TrackingIngestResult,
        },
        transition_api::TransitionApi,
    },
    status_machine::can_transition,
    traits::{OrderManagement, OrderQueryFilter, StatusChange, TrackingManagement},
};

/// Shipment tracking for paid orders.
///
/// Tracking records are created when the seller ships, fed by manual updates, carrier polling and carrier webhooks,
/// and never deleted. Carrier progress drives the order forward where the transition table allows it. Buyer
/// confirmation and carrier delivery events converge on the same idempotent "mark delivered" step.
pub struct TrackingApi<B, C> {
    db: B,
    carrier: C,
    transitions: TransitionApi<B>,
}

impl<B, C> Debug for TrackingApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrackingApi")
    }
}

impl<B: Clone, C> TrackingApi<B, C> {
    pub fn new(db: B, carrier: C, producers: EventProducers) -> Self {
        let transitions = TransitionApi::new(db.clone(), producers);
        Self { db, carrier, transitions }
    }
}

impl<B, C> TrackingApi<B, C>
where
    B: OrderManagement + TrackingManagement,
    C: CarrierClient,
{
    /// The seller hands the parcel to a carrier.
    ///
    /// Checks, in order: the caller is the seller, the order has no active tracking record, the payment is confirmed
    /// (`paid` or `funds_held`), and the tracking number fits the carrier's format. The tracking record, its first
    /// event and the move to `shipped` are written together.
    pub async fn mark_shipped(
        &self,
        order_id: i64,
        seller_id: &str,
        request: ShipOrderRequest,
    ) -> Result<Tracking, LifecycleError> {
        let order = self.transitions.fetch_order(order_id).await?;
        ensure_seller(&order, seller_id)?;
        if let Some(existing) = self.db.fetch_active_tracking_for_order(order_id).await? {
            debug!("📦️ Order {order_id} already ships with {} ({})", existing.carrier, existing.tracking_number);
            return Err(LifecycleError::DuplicateTracking(order_id));
        }
        if !matches!(order.status, OrderStatus::Paid | OrderStatus::FundsHeld) {
            return Err(LifecycleError::invalid_state(
                order_id,
                order.status,
                "Only orders with a confirmed payment can be shipped",
            ));
        }
        let carrier = normalize_carrier(&request.carrier);
        if carrier.is_empty() {
            return Err(LifecycleError::Validation("A carrier is required".to_string()));
        }
        let tracking_number = canonical_tracking_number(&request.tracking_number);
        if !is_valid_tracking_number(&carrier, &tracking_number) {
            return Err(LifecycleError::InvalidTrackingFormat { carrier, tracking_number: request.tracking_number });
        }
        let now = Utc::now();
        let first_event = NewTrackingEvent {
            timestamp: now,
            status: TrackingStatus::InfoReceived,
            description: format!("Shipment registered with {carrier}"),
            location: None,
            source: EventSource::Manual,
        };
        let tracking = NewTracking {
            order_id,
            carrier,
            tracking_number,
            tracking_url: request.tracking_url.filter(|u| !u.trim().is_empty()),
            estimated_delivery: request.estimated_delivery,
        };
        let (order, tracking) =
            self.db.ship_order(&order, tracking, first_event, Actor::Seller(seller_id.to_string())).await?;
        info!(
            "📦️ Order {} [{}] shipped with {} ({})",
            order.id, order.transaction_id, tracking.carrier, tracking.tracking_number
        );
        self.transitions.producers().publish_order_shipped(OrderShippedEvent::new(order, tracking.clone())).await;
        Ok(tracking)
    }

    pub async fn fetch_tracking(&self, tracking_id: i64) -> Result<Tracking, LifecycleError> {
        self.db
            .fetch_tracking(tracking_id)
            .await?
            .ok_or_else(|| LifecycleError::TrackingNotFound(tracking_id.to_string()))
    }

    pub async fn tracking_details(
        &self,
        tracking_id: i64,
        user_id: &str,
        is_admin: bool,
    ) -> Result<TrackingDetails, LifecycleError> {
        let tracking = self.fetch_tracking(tracking_id).await?;
        let order = self.transitions.fetch_order(tracking.order_id).await?;
        ensure_participant(&order, user_id, is_admin)?;
        let events = self.db.fetch_tracking_events(tracking_id).await?;
        Ok(TrackingDetails { tracking, events })
    }

    /// The most recent tracking record for an order, active or not.
    pub async fn tracking_for_order(
        &self,
        order_id: i64,
        user_id: &str,
        is_admin: bool,
    ) -> Result<TrackingDetails, LifecycleError> {
        let order = self.transitions.fetch_order(order_id).await?;
        ensure_participant(&order, user_id, is_admin)?;
        let tracking = self
            .db
            .fetch_latest_tracking_for_order(order_id)
            .await?
            .ok_or_else(|| LifecycleError::TrackingNotFound(format!("for order {order_id}")))?;
        let events = self.db.fetch_tracking_events(tracking.id).await?;
        Ok(TrackingDetails { tracking, events })
    }

    /// Appends a single event and lets it drive the order forward.
    ///
    /// Once the shipment is `delivered`, later events are still recorded but the headline status stays put.
    pub async fn add_tracking_event(
        &self,
        tracking_id: i64,
        event: NewTrackingEvent,
        actor: Actor,
    ) -> Result<Tracking, LifecycleError> {
        let tracking = self.fetch_tracking(tracking_id).await?;
        let result = self.ingest_events(tracking, vec![event], actor).await?;
        Ok(result.tracking)
    }

    /// A status update typed in by the order's seller.
    pub async fn record_manual_event(
        &self,
        tracking_id: i64,
        seller_id: &str,
        update: ManualTrackingUpdate,
    ) -> Result<Tracking, LifecycleError> {
        let tracking = self.fetch_tracking(tracking_id).await?;
        let order = self.transitions.fetch_order(tracking.order_id).await?;
        ensure_seller(&order, seller_id)?;
        if update.description.trim().is_empty() {
            return Err(LifecycleError::Validation("A tracking update needs a description".to_string()));
        }
        let event = NewTrackingEvent {
            timestamp: update.timestamp.unwrap_or_else(Utc::now),
            status: update.status,
            description: update.description.trim().to_string(),
            location: update.location,
            source: EventSource::Manual,
        };
        let result = self.ingest_events(tracking, vec![event], Actor::Seller(seller_id.to_string())).await?;
        Ok(result.tracking)
    }

    /// The buyer confirms receipt.
    ///
    /// Records the confirmation (rating 1-5, feedback, proof), moves the order to `delivered` if it is not there yet,
    /// and then completes it. Confirming twice is harmless.
    pub async fn confirm_delivery(
        &self,
        tracking_id: i64,
        buyer_id: &str,
        request: ConfirmDeliveryRequest,
    ) -> Result<Tracking, LifecycleError> {
        let tracking = self.fetch_tracking(tracking_id).await?;
        let order = self.transitions.fetch_order(tracking.order_id).await?;
        ensure_buyer(&order, buyer_id)?;
        if let Some(rating) = request.rating {
            if !(1..=5).contains(&rating) {
                return Err(LifecycleError::Validation(format!("Rating must be between 1 and 5, not {rating}")));
            }
        }
        if !matches!(
            order.status,
            OrderStatus::Shipped |
                OrderStatus::InTransit |
                OrderStatus::OutForDelivery |
                OrderStatus::Delivered |
                OrderStatus::Completed
        ) {
            return Err(LifecycleError::invalid_state(
                order.id,
                order.status,
                "Delivery can only be confirmed for orders that have shipped",
            ));
        }
        let confirmation = DeliveryConfirmation {
            is_delivered: true,
            delivered_at: Some(Utc::now()),
            confirmed_by: Some(DeliveryConfirmer::Buyer),
            rating: request.rating,
            feedback: request.feedback,
            delivery_proof: request.delivery_proof,
        };
        let (tracking, newly_recorded) = self.db.record_delivery(tracking.id, confirmation.clone()).await?;
        let tracking = if newly_recorded {
            tracking
        } else {
            debug!("📦️ Delivery of tracking {tracking_id} was already recorded. Adding the buyer's feedback");
            self.db.add_delivery_feedback(tracking.id, confirmation).await?
        };
        let actor = Actor::Buyer(buyer_id.to_string());
        let (order, _) = self.mark_order_delivered(order.id, DeliveryConfirmer::Buyer, actor.clone()).await?;
        self.advance_if_allowed(order.id, OrderStatus::Completed, actor, "Buyer confirmed receipt").await?;
        Ok(tracking)
    }

    /// Moves the order to `delivered`. Returns `false` in the second field if it already was (or has moved past it),
    /// or if its current status does not allow delivery.
    async fn mark_order_delivered(
        &self,
        order_id: i64,
        confirmer: DeliveryConfirmer,
        actor: Actor,
    ) -> Result<(Order, bool), LifecycleError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let order = self.transitions.fetch_order(order_id).await?;
            if order.delivered_at.is_some() || matches!(order.status, OrderStatus::Delivered | OrderStatus::Completed)
            {
                debug!("📦️ Order {order_id} is already delivered. Nothing to do");
                return Ok((order, false));
            }
            if !can_transition(order.status, OrderStatus::Delivered) {
                info!("📦️ Delivery reported for order {order_id}, but it is {}. Order left as is", order.status);
                return Ok((order, false));
            }
            let change = StatusChange::new(OrderStatus::Delivered, actor.clone())
                .with_note(format!("Delivery confirmed by {confirmer}"));
            match self.transitions.apply_transition(&order, change).await {
                Ok(updated) => {
                    info!("📦️ Order {order_id} delivered. Confirmed by {confirmer}");
                    let event = OrderDeliveredEvent::new(updated.clone(), confirmer);
                    self.transitions.producers().publish_order_delivered(event).await;
                    return Ok((updated, true));
                },
                Err(LifecycleError::ConcurrentModification(_)) if attempt < 2 => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Applies `target` if the transition table allows it from wherever the order is now. Returns the order as it
    /// stands afterwards and whether this call moved it.
    async fn advance_if_allowed(
        &self,
        order_id: i64,
        target: OrderStatus,
        actor: Actor,
        note: &str,
    ) -> Result<(Order, bool), LifecycleError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let order = self.transitions.fetch_order(order_id).await?;
            if order.status == target || !can_transition(order.status, target) {
                trace!("📦️ Order {order_id} stays {} (shipment reports {target})", order.status);
                return Ok((order, false));
            }
            let change = StatusChange::new(target, actor.clone()).with_note(note);
            match self.transitions.apply_transition(&order, change).await {
                Ok(updated) => return Ok((updated, true)),
                Err(LifecycleError::ConcurrentModification(_)) if attempt < 2 => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Appends the events that are not already recorded (same timestamp and description), oldest first, and applies
    /// each one to the order.
    async fn ingest_events(
        &self,
        tracking: Tracking,
        mut events: Vec<NewTrackingEvent>,
        actor: Actor,
    ) -> Result<TrackingIngestResult, LifecycleError> {
        let mut known = self.db.fetch_tracking_events(tracking.id).await?;
        events.sort_by_key(|e| e.timestamp);
        let mut appended = 0;
        let mut duplicates = 0;
        let mut current = tracking;
        for event in events {
            if known.iter().any(|k| event.is_same_event(k)) {
                duplicates += 1;
                continue;
            }
            let (tracking, stored) = self.db.append_tracking_event(current.id, event).await?;
            appended += 1;
            current = self.apply_event_to_order(tracking, &stored, actor.clone()).await?;
            known.push(stored);
        }
        if duplicates > 0 {
            debug!("📦️ Dropped {duplicates} already recorded events for tracking {}", current.id);
        }
        Ok(TrackingIngestResult { tracking: current, appended, duplicates })
    }

    async fn apply_event_to_order(
        &self,
        tracking: Tracking,
        event: &TrackingEvent,
        actor: Actor,
    ) -> Result<Tracking, LifecycleError> {
        if !tracking.is_active {
            debug!("📦️ Tracking {} is inactive. Event recorded for audit only", tracking.id);
            return Ok(tracking);
        }
        if event.status == TrackingStatus::Delivered {
            let confirmation = DeliveryConfirmation {
                is_delivered: true,
                delivered_at: Some(event.timestamp),
                confirmed_by: Some(DeliveryConfirmer::Carrier),
                ..Default::default()
            };
            let (tracking, _) = self.db.record_delivery(tracking.id, confirmation).await?;
            self.mark_order_delivered(tracking.order_id, DeliveryConfirmer::Carrier, actor).await?;
            return Ok(tracking);
        }
        if let Some(target) = event.status.implied_order_status() {
            let note = format!("Shipment update: {}", event.description);
            self.advance_if_allowed(tracking.order_id, target, actor, &note).await?;
        }
        Ok(tracking)
    }

    /// Polls the carrier and appends whatever is new.
    pub async fn sync_with_carrier(&self, tracking_id: i64) -> Result<TrackingIngestResult, LifecycleError> {
        let tracking = self.fetch_tracking(tracking_id).await?;
        if !tracking.is_active {
            return Err(LifecycleError::Validation(format!("Tracking {tracking_id} has been deactivated")));
        }
        let checkpoints = self.carrier.fetch_checkpoints(&tracking.carrier, &tracking.tracking_number).await?;
        let events = checkpoints.into_iter().map(|c| c.into_event(EventSource::CarrierSync)).collect();
        let result = self.ingest_events(tracking, events, Actor::Carrier).await?;
        self.db.mark_tracking_synced(tracking_id).await?;
        debug!("📦️ Synced tracking {tracking_id}: {} new, {} known", result.appended, result.duplicates);
        Ok(result)
    }

    pub async fn sync_for_user(
        &self,
        tracking_id: i64,
        user_id: &str,
        is_admin: bool,
    ) -> Result<TrackingIngestResult, LifecycleError> {
        let tracking = self.fetch_tracking(tracking_id).await?;
        let order = self.transitions.fetch_order(tracking.order_id).await?;
        ensure_participant(&order, user_id, is_admin)?;
        self.sync_with_carrier(tracking_id).await
    }

    /// Syncs every active, undelivered shipment. Failures are logged and counted, and do not stop the sweep.
    pub async fn sync_all(&self) -> Result<SyncSummary, LifecycleError> {
        let trackings = self.db.fetch_trackings_to_sync().await?;
        let mut summary = SyncSummary::default();
        for tracking in trackings {
            match self.sync_with_carrier(tracking.id).await {
                Ok(result) => {
                    summary.synced += 1;
                    summary.new_events += result.appended;
                },
                Err(e) => {
                    summary.failed += 1;
                    warn!("📦️ Could not sync tracking {} ({}): {e}", tracking.id, tracking.tracking_number);
                },
            }
        }
        Ok(summary)
    }

    /// A carrier pushed checkpoints for a shipment. Delivery reported this way has the same effect as a buyer
    /// confirmation, except that the order is not completed.
    pub async fn handle_carrier_update(&self, update: CarrierUpdate) -> Result<TrackingIngestResult, LifecycleError> {
        let number = canonical_tracking_number(&update.tracking_number);
        let tracking = self
            .db
            .fetch_active_tracking_by_number(&number)
            .await?
            .ok_or_else(|| LifecycleError::TrackingNotFound(number.clone()))?;
        let carrier = normalize_carrier(&update.carrier);
        if carrier != tracking.carrier {
            warn!("📦️ Update for {number} came from {carrier}, but the shipment is registered with {}", tracking.carrier);
        }
        let events = update.events.into_iter().map(|e| NewTrackingEvent { source: EventSource::Webhook, ..e }).collect();
        self.ingest_events(tracking, events, Actor::Carrier).await
    }

    pub async fn deactivate_tracking(&self, tracking_id: i64, reason: &str) -> Result<Tracking, LifecycleError> {
        if reason.trim().is_empty() {
            return Err(LifecycleError::Validation("A reason is required to deactivate tracking".to_string()));
        }
        let tracking = self.fetch_tracking(tracking_id).await?;
        if !tracking.is_active {
            return Ok(tracking);
        }
        let tracking = self.db.deactivate_tracking(tracking_id, reason.trim()).await?;
        warn!("📦️ Tracking {tracking_id} for order {} deactivated: {reason}", tracking.order_id);
        Ok(tracking)
    }

    /// Completes orders that have sat in `delivered` for longer than `after`, releasing escrow without a buyer
    /// confirmation.
    pub async fn auto_complete_delivered(&self, after: Duration) -> Result<Vec<Order>, LifecycleError> {
        let cutoff = Utc::now() - after;
        let filter = OrderQueryFilter::default().with_status(OrderStatus::Delivered).delivered_before(cutoff);
        let orders = self.db.search_orders(filter).await?;
        let mut completed = Vec::with_capacity(orders.len());
        for order in orders {
            let note = format!("Completed automatically {} days after delivery", after.num_days());
            let change = StatusChange::new(OrderStatus::Completed, Actor::System).with_note(note);
            match self.transitions.apply_transition(&order, change).await {
                Ok(order) => completed.push(order),
                Err(e) => warn!("📦️ Could not auto-complete order {}: {e}", order.id),
            }
        }
        if !completed.is_empty() {
            info!("📦️ {} delivered orders were completed automatically", completed.len());
        }
        Ok(completed)
    }
}
