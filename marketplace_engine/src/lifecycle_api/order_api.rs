use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{
        Actor,
        FulfillmentRecord,
        FulfillmentStatus,
        NewOrder,
        Order,
        OrderStatus,
        ProductStatus,
        StatusHistoryEntry,
    },
    errors::LifecycleError,
    events::EventProducers,
    lifecycle_api::{
        order_objects::{ensure_buyer, ensure_participant, CreateOrderRequest, OrderDetails},
        transition_api::TransitionApi,
    },
    pricing::{compute_totals, FeeSchedule},
    traits::{OrderManagement, OrderQueryFilter, ProductCatalog, StatusChange, TrackingManagement},
};

/// `OrderApi` covers the buyer- and admin-driven parts of the order aggregate: creation, queries, cancellation,
/// disputes and manual status overrides.
pub struct OrderApi<B> {
    db: B,
    fees: FeeSchedule,
    transitions: TransitionApi<B>,
}

impl<B> Debug for OrderApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderApi")
    }
}

impl<B: Clone> OrderApi<B> {
    pub fn new(db: B, fees: FeeSchedule, producers: EventProducers) -> Self {
        let transitions = TransitionApi::new(db.clone(), producers);
        Self { db, fees, transitions }
    }

    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }
}

impl<B> OrderApi<B>
where B: OrderManagement + ProductCatalog + TrackingManagement
{
    /// Prices and stores a new order in the `pending` state.
    ///
    /// The product must exist and be `active`, the buyer cannot be the product's seller, and the shipping address must
    /// carry every required field. All amounts come from the catalog and the fee schedule, never from the request.
    pub async fn create_order(&self, buyer_id: &str, request: CreateOrderRequest) -> Result<Order, LifecycleError> {
        if buyer_id.trim().is_empty() {
            return Err(LifecycleError::Validation("A buyer id is required".to_string()));
        }
        let missing = request.shipping_address.missing_fields();
        if !missing.is_empty() {
            return Err(LifecycleError::Validation(format!(
                "The shipping address is missing required fields: {}",
                missing.join(", ")
            )));
        }
        let product = self
            .db
            .fetch_product(&request.product_id)
            .await?
            .ok_or_else(|| LifecycleError::Validation(format!("Product {} does not exist", request.product_id)))?;
        if product.status != ProductStatus::Active {
            return Err(LifecycleError::Validation(format!(
                "Product {} is {} and cannot be purchased",
                product.id, product.status
            )));
        }
        if product.seller_id == buyer_id {
            return Err(LifecycleError::Validation("Sellers cannot buy their own products".to_string()));
        }
        let pricing =
            self.fees.pricing_input(request.gateway, product.price, product.shipping_cost, &product.currency);
        let amounts = compute_totals(&pricing);
        let order = NewOrder {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            buyer_id: buyer_id.to_string(),
            seller_id: product.seller_id.clone(),
            product_id: product.id.clone(),
            payment_method: request.payment_method,
            gateway: request.gateway,
            amounts,
            shipping_address: request.shipping_address,
        };
        let order = self.db.insert_order(order).await?;
        info!(
            "🔄️ New {} order {} [{}] for {} {} created by {buyer_id}",
            order.payment_method, order.id, order.transaction_id, order.amounts.total_amount, order.amounts.currency
        );
        Ok(order)
    }

    pub async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, LifecycleError> {
        self.db.fetch_order(order_id).await
    }

    pub async fn fetch_order_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>, LifecycleError> {
        self.db.fetch_order_by_transaction_id(transaction_id).await
    }

    /// Fetches an order on behalf of a user, who must be its buyer or seller, or an admin.
    pub async fn order_for_user(&self, order_id: i64, user_id: &str, is_admin: bool) -> Result<Order, LifecycleError> {
        let order = self.transitions.fetch_order(order_id).await?;
        ensure_participant(&order, user_id, is_admin)?;
        Ok(order)
    }

    pub async fn order_details(
        &self,
        order_id: i64,
        user_id: &str,
        is_admin: bool,
    ) -> Result<OrderDetails, LifecycleError> {
        let order = self.order_for_user(order_id, user_id, is_admin).await?;
        let status_history = self.db.fetch_status_history(order_id).await?;
        let tracking = self.db.fetch_latest_tracking_for_order(order_id).await?;
        Ok(OrderDetails { order, status_history, tracking })
    }

    pub async fn status_history(
        &self,
        order_id: i64,
        user_id: &str,
        is_admin: bool,
    ) -> Result<Vec<StatusHistoryEntry>, LifecycleError> {
        self.order_for_user(order_id, user_id, is_admin).await?;
        self.db.fetch_status_history(order_id).await
    }

    pub async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, LifecycleError> {
        self.db.search_orders(filter).await
    }

    /// Orders where the user is the buyer or the seller.
    pub async fn orders_for_user(
        &self,
        user_id: &str,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, LifecycleError> {
        let mut filter = OrderQueryFilter::default().with_participant(user_id);
        if let Some(status) = status {
            filter = filter.with_status(status);
        }
        self.db.search_orders(filter).await
    }

    pub async fn fulfillments_for_seller(
        &self,
        seller_id: &str,
        status: Option<FulfillmentStatus>,
    ) -> Result<Vec<FulfillmentRecord>, LifecycleError> {
        self.db.fetch_fulfillments_for_seller(seller_id, status).await
    }

    /// Cancels an order.
    ///
    /// Buyers may cancel their own orders until a payment has been confirmed. Admins may cancel anything the transition
    /// table allows. Cancelling an already cancelled order is a no-op.
    pub async fn cancel_order(
        &self,
        order_id: i64,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<Order, LifecycleError> {
        let order = self.transitions.fetch_order(order_id).await?;
        if order.status == OrderStatus::Cancelled {
            return Ok(order);
        }
        match &actor {
            Actor::Buyer(id) => {
                ensure_buyer(&order, id)?;
                if order.payment_completed || order.status.is_post_payment() {
                    return Err(LifecycleError::invalid_state(
                        order.id,
                        order.status,
                        "Paid orders can only be cancelled by an administrator",
                    ));
                }
            },
            Actor::Admin(_) | Actor::System => {},
            other => return Err(LifecycleError::Authorization(format!("{other} may not cancel orders"))),
        }
        let note = reason.unwrap_or_else(|| "Cancelled".to_string());
        let change = StatusChange::new(OrderStatus::Cancelled, actor).with_note(note);
        self.transitions.apply_transition(&order, change).await
    }

    /// A buyer raises a dispute. Raising a second dispute on a disputed order returns the order unchanged.
    pub async fn raise_dispute(&self, order_id: i64, buyer_id: &str, reason: &str) -> Result<Order, LifecycleError> {
        let order = self.transitions.fetch_order(order_id).await?;
        ensure_buyer(&order, buyer_id)?;
        if order.status == OrderStatus::Disputed {
            debug!("🔄️ Order {order_id} is already disputed");
            return Ok(order);
        }
        let change = StatusChange::new(OrderStatus::Disputed, Actor::Buyer(buyer_id.to_string()))
            .with_dispute_reason(reason.trim())
            .with_note(format!("Dispute raised by buyer: {}", reason.trim()));
        let order = self.transitions.apply_transition(&order, change).await?;
        warn!("🔄️ Order {order_id} has been disputed by {buyer_id}: {reason}");
        Ok(order)
    }

    /// Manual override by an admin. Still subject to the transition table.
    ///
    /// Payment and shipping states are out of reach: payment confirmation only happens through the payment coordinator
    /// (which credits the seller and creates the fulfillment record) and shipping only through `mark_shipped` (which
    /// creates the tracking record).
    pub async fn admin_transition(
        &self,
        order_id: i64,
        admin_id: &str,
        target: OrderStatus,
        note: Option<String>,
    ) -> Result<Order, LifecycleError> {
        if let Some(path) = reserved_for(target) {
            return Err(LifecycleError::Validation(format!(
                "Orders cannot be manually moved to {target}. That status is only reached through {path}"
            )));
        }
        let order = self.transitions.fetch_order(order_id).await?;
        let mut change = StatusChange::new(target, Actor::Admin(admin_id.to_string()));
        if let Some(note) = note {
            if target == OrderStatus::Disputed {
                change = change.with_dispute_reason(note.clone());
            }
            change = change.with_note(note);
        }
        let order = self.transitions.apply_transition(&order, change).await?;
        warn!("🔄️ Admin {admin_id} manually moved order {order_id} to {target}");
        Ok(order)
    }
}

/// The code path that owns `target`, if admins may not set it by hand.
fn reserved_for(target: OrderStatus) -> Option<&'static str> {
    match target {
        OrderStatus::Processing | OrderStatus::Paid | OrderStatus::FundsHeld => Some("a confirmed gateway payment"),
        OrderStatus::Shipped => Some("the seller's shipping request"),
        OrderStatus::InTransit | OrderStatus::OutForDelivery | OrderStatus::Delivered => Some("tracking updates"),
        _ => None,
    }
}
