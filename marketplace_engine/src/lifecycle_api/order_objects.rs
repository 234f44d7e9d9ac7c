use serde::{Deserialize, Serialize};

use crate::{
    db_types::{GatewayKind, Order, PaymentMethod, ShippingAddress, StatusHistoryEntry, Tracking},
    errors::LifecycleError,
};

/// What a buyer submits to start a purchase. Prices are never part of the request; they come from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub product_id: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub gateway: GatewayKind,
    #[serde(default)]
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub order: Order,
    pub status_history: Vec<StatusHistoryEntry>,
    pub tracking: Option<Tracking>,
}

/// Only the buyer, the seller and admins may see an order.
pub fn ensure_participant(order: &Order, user_id: &str, is_admin: bool) -> Result<(), LifecycleError> {
    if is_admin || order.buyer_id == user_id || order.seller_id == user_id {
        Ok(())
    } else {
        Err(LifecycleError::Authorization(format!("{user_id} is not a participant in order {}", order.id)))
    }
}

pub fn ensure_buyer(order: &Order, user_id: &str) -> Result<(), LifecycleError> {
    if order.buyer_id == user_id {
        Ok(())
    } else {
        Err(LifecycleError::Authorization(format!("Only the buyer of order {} may do this", order.id)))
    }
}

pub fn ensure_seller(order: &Order, user_id: &str) -> Result<(), LifecycleError> {
    if order.seller_id == user_id {
        Ok(())
    } else {
        Err(LifecycleError::Authorization(format!("Only the seller of order {} may do this", order.id)))
    }
}
