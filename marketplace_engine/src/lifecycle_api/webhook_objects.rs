use serde::{Deserialize, Serialize};

use crate::{
    db_types::GatewayKind,
    lifecycle_api::{payment_objects::GatewayConfirmation, tracking_objects::CarrierUpdate},
};

/// The ways an inbound webhook may point at an order. Tried in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderReference {
    pub gateway_transaction_id: Option<String>,
    pub order_id: Option<i64>,
    pub transaction_id: Option<String>,
}

impl OrderReference {
    pub fn is_empty(&self) -> bool {
        self.gateway_transaction_id.is_none() && self.order_id.is_none() && self.transaction_id.is_none()
    }
}

impl std::fmt::Display for OrderReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = [
            self.gateway_transaction_id.as_ref().map(|s| format!("gateway txid {s}")),
            self.order_id.map(|id| format!("order #{id}")),
            self.transaction_id.as_ref().map(|s| format!("transaction {s}")),
        ];
        let parts = parts.into_iter().flatten().collect::<Vec<_>>();
        if parts.is_empty() {
            write!(f, "no reference")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Every inbound event, after the gateway- or carrier-specific payload has been decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    PaymentCompleted { reference: OrderReference, confirmation: GatewayConfirmation },
    PaymentFailed { reference: OrderReference, gateway: GatewayKind, reason: String },
    PaymentCancelled { reference: OrderReference, gateway: GatewayKind },
    DisputeCreated { reference: OrderReference, gateway: GatewayKind, reason: String },
    TrackingUpdated(CarrierUpdate),
    /// An event type we do not act on. Acknowledged so the sender stops retrying.
    Ignored { event_type: String },
}

impl NormalizedEvent {
    pub fn event_type(&self) -> &str {
        match self {
            Self::PaymentCompleted { .. } => "payment_completed",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::PaymentCancelled { .. } => "payment_cancelled",
            Self::DisputeCreated { .. } => "dispute_created",
            Self::TrackingUpdated(_) => "tracking_updated",
            Self::Ignored { .. } => "ignored",
        }
    }
}

/// The response body of every webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub success: bool,
    pub event_type: String,
    pub transaction_id: Option<String>,
    pub message: String,
}

impl WebhookOutcome {
    pub fn new<S: Into<String>>(event_type: &str, transaction_id: Option<String>, message: S) -> Self {
        Self { success: true, event_type: event_type.to_string(), transaction_id, message: message.into() }
    }
}
