use serde::{Deserialize, Serialize};

use crate::db_types::{DeliveryConfirmer, Order, OrderStatus, Tracking};

/// Payment was confirmed for the first time. Never raised for idempotent repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShippedEvent {
    pub order: Order,
    pub tracking: Tracking,
}

impl OrderShippedEvent {
    pub fn new(order: Order, tracking: Tracking) -> Self {
        Self { order, tracking }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeliveredEvent {
    pub order: Order,
    pub confirmed_by: DeliveryConfirmer,
}

impl OrderDeliveredEvent {
    pub fn new(order: Order, confirmed_by: DeliveryConfirmer) -> Self {
        Self { order, confirmed_by }
    }
}

/// The order reached a state where it will not be fulfilled: cancelled, refunded, returned or failed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatus,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderPaid(OrderPaidEvent),
    OrderShipped(OrderShippedEvent),
    OrderDelivered(OrderDeliveredEvent),
    OrderAnnulled(OrderAnnulledEvent),
}
