use crate::{
    db_types::{FulfillmentRecord, FulfillmentStatus, NewOrder, Order, StatusHistoryEntry},
    errors::LifecycleError,
    traits::data_objects::{OrderQueryFilter, StatusChange},
};

#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Stores a priced order in the `pending` state, along with the first status history entry, in one transaction.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, LifecycleError>;

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, LifecycleError>;

    async fn fetch_order_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>, LifecycleError>;

    async fn fetch_order_by_gateway_transaction_id(&self, gateway_txid: &str) -> Result<Option<Order>, LifecycleError>;

    /// Results are ordered by `created_at`, oldest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LifecycleError>;

    async fn fetch_status_history(&self, order_id: i64) -> Result<Vec<StatusHistoryEntry>, LifecycleError>;

    /// Writes a status change and appends the matching history entry atomically.
    ///
    /// The write only succeeds if the stored order still carries `order.version` (and, when the change completes the
    /// payment, the completion flag is still clear). Otherwise nothing is written and
    /// [`LifecycleError::ConcurrentModification`] is returned.
    ///
    /// The transition itself must already have been validated by the caller.
    async fn apply_status_change(&self, order: &Order, change: StatusChange) -> Result<Order, LifecycleError>;

    /// Creates the fulfillment record for a paid order, keyed by the order's `transaction_id`.
    /// Returns `false` in the second field if the record already existed.
    async fn insert_fulfillment(&self, order: &Order) -> Result<(FulfillmentRecord, bool), LifecycleError>;

    async fn fetch_fulfillment(&self, transaction_id: &str) -> Result<Option<FulfillmentRecord>, LifecycleError>;

    async fn fetch_fulfillments_for_seller(
        &self,
        seller_id: &str,
        status: Option<FulfillmentStatus>,
    ) -> Result<Vec<FulfillmentRecord>, LifecycleError>;
}
