use crate::{
    db_types::{Actor, DeliveryConfirmation, NewTracking, NewTrackingEvent, Order, Tracking, TrackingEvent},
    errors::LifecycleError,
};

#[allow(async_fn_in_trait)]
pub trait TrackingManagement {
    /// In a single transaction:
    /// * creates the tracking record and its first event,
    /// * moves the order to `shipped` (version checked, with a history entry),
    /// * marks the order's fulfillment record as shipped.
    ///
    /// Fails with [`LifecycleError::DuplicateTracking`] if the order already has an active tracking record.
    async fn ship_order(
        &self,
        order: &Order,
        tracking: NewTracking,
        first_event: NewTrackingEvent,
        actor: Actor,
    ) -> Result<(Order, Tracking), LifecycleError>;

    async fn fetch_tracking(&self, id: i64) -> Result<Option<Tracking>, LifecycleError>;

    async fn fetch_active_tracking_for_order(&self, order_id: i64) -> Result<Option<Tracking>, LifecycleError>;

    /// The most recent tracking record for the order, active or not.
    async fn fetch_latest_tracking_for_order(&self, order_id: i64) -> Result<Option<Tracking>, LifecycleError>;

    async fn fetch_active_tracking_by_number(&self, tracking_number: &str) -> Result<Option<Tracking>, LifecycleError>;

    /// All events for the tracking record, ordered by event timestamp and then insertion order.
    async fn fetch_tracking_events(&self, tracking_id: i64) -> Result<Vec<TrackingEvent>, LifecycleError>;

    /// Appends the event and moves the headline status to the event's status, unless the headline status is already
    /// `delivered`, in which case only the event is stored.
    async fn append_tracking_event(
        &self,
        tracking_id: i64,
        event: NewTrackingEvent,
    ) -> Result<(Tracking, TrackingEvent), LifecycleError>;

    /// Records delivery. Returns `false` in the second field if delivery had already been recorded, in which case
    /// the existing confirmation is left untouched.
    async fn record_delivery(
        &self,
        tracking_id: i64,
        confirmation: DeliveryConfirmation,
    ) -> Result<(Tracking, bool), LifecycleError>;

    /// Adds rating, feedback and proof of delivery to a record whose delivery is already confirmed, without
    /// overwriting values that are already set.
    async fn add_delivery_feedback(
        &self,
        tracking_id: i64,
        feedback: DeliveryConfirmation,
    ) -> Result<Tracking, LifecycleError>;

    async fn deactivate_tracking(&self, tracking_id: i64, reason: &str) -> Result<Tracking, LifecycleError>;

    /// Active tracking records that have not been delivered yet.
    async fn fetch_trackings_to_sync(&self) -> Result<Vec<Tracking>, LifecycleError>;

    async fn mark_tracking_synced(&self, tracking_id: i64) -> Result<(), LifecycleError>;
}
