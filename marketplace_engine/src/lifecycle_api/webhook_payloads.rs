//! Decoding of the gateway and carrier webhook payloads into [`NormalizedEvent`]s.
//!
//! Only the fields the lifecycle needs are read. Anything else in the payload is ignored, and event types we do not
//! act on decode to [`NormalizedEvent::Ignored`].
use std::collections::HashMap;

use mkp_common::Money;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    db_types::{EventSource, GatewayKind},
    errors::LifecycleError,
    integrations::AfterShipCheckpoint,
    lifecycle_api::{
        payment_objects::GatewayConfirmation,
        tracking_objects::CarrierUpdate,
        webhook_objects::{NormalizedEvent, OrderReference},
    },
};

fn malformed(source: &str, e: impl std::fmt::Display) -> LifecycleError {
    LifecycleError::Validation(format!("Malformed {source} webhook payload. {e}"))
}

pub fn normalize_gateway_payload(gateway: GatewayKind, body: &[u8]) -> Result<NormalizedEvent, LifecycleError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| malformed(gateway.as_str(), e))?;
    match gateway {
        GatewayKind::Stripe => normalize_stripe(value),
        GatewayKind::Paypal => normalize_paypal(value),
        GatewayKind::Paytabs => normalize_paytabs(value),
    }
}

//--------------------------------------        Stripe         ---------------------------------------------------------
#[derive(Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Deserialize)]
struct StripeEventData {
    object: StripeObject,
}

#[derive(Deserialize)]
struct StripeObject {
    id: String,
    amount: Option<i64>,
    amount_received: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    /// Set on dispute objects.
    payment_intent: Option<String>,
    reason: Option<String>,
    last_payment_error: Option<StripeError>,
}

#[derive(Deserialize)]
struct StripeError {
    message: Option<String>,
}

fn metadata_reference(gateway_txid: Option<String>, metadata: &HashMap<String, String>) -> OrderReference {
    let get = |keys: &[&str]| keys.iter().find_map(|k| metadata.get(*k)).map(|v| v.trim().to_string());
    OrderReference {
        gateway_transaction_id: gateway_txid,
        order_id: get(&["orderId", "order_id"]).and_then(|v| v.parse().ok()),
        transaction_id: get(&["transactionId", "transaction_id"]).filter(|v| !v.is_empty()),
    }
}

fn normalize_stripe(value: Value) -> Result<NormalizedEvent, LifecycleError> {
    let raw = value.pointer("/data/object").map(|o| o.to_string());
    let event: StripeEvent = serde_json::from_value(value).map_err(|e| malformed("stripe", e))?;
    let object = event.data.object;
    let gateway = GatewayKind::Stripe;
    let normalized = match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            let reference = metadata_reference(Some(object.id.clone()), &object.metadata);
            let mut confirmation = GatewayConfirmation::new(gateway, object.id);
            if let (Some(amount), Some(currency)) = (object.amount_received.or(object.amount), object.currency) {
                confirmation = confirmation.with_amount(Money::from(amount), &currency);
            }
            if let Some(raw) = raw {
                confirmation = confirmation.with_raw(raw);
            }
            NormalizedEvent::PaymentCompleted { reference, confirmation }
        },
        "payment_intent.payment_failed" => {
            let reason = object
                .last_payment_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "The payment was declined".to_string());
            let reference = metadata_reference(Some(object.id), &object.metadata);
            NormalizedEvent::PaymentFailed { reference, gateway, reason }
        },
        "payment_intent.canceled" => {
            NormalizedEvent::PaymentCancelled { reference: metadata_reference(Some(object.id), &object.metadata), gateway }
        },
        "charge.dispute.created" => {
            let reference = metadata_reference(object.payment_intent, &object.metadata);
            let reason = object.reason.unwrap_or_else(|| "unspecified".to_string());
            NormalizedEvent::DisputeCreated { reference, gateway, reason }
        },
        other => NormalizedEvent::Ignored { event_type: other.to_string() },
    };
    Ok(normalized)
}

//--------------------------------------        PayPal         ---------------------------------------------------------
#[derive(Deserialize)]
struct PaypalEvent {
    event_type: String,
    #[serde(default)]
    resource: Value,
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_amount(value: Option<&Value>) -> Option<Money> {
    match value? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

fn normalize_paypal(value: Value) -> Result<NormalizedEvent, LifecycleError> {
    let event: PaypalEvent = serde_json::from_value(value).map_err(|e| malformed("paypal", e))?;
    let resource = &event.resource;
    let gateway = GatewayKind::Paypal;
    // Payments are initiated against a PayPal order; captures point back to it through related_ids
    let paypal_order = str_at(resource, "/supplementary_data/related_ids/order_id");
    let resource_id = str_at(resource, "/id");
    let reference = OrderReference {
        gateway_transaction_id: paypal_order.clone().or_else(|| resource_id.clone()),
        order_id: str_at(resource, "/invoice_id").and_then(|v| v.parse().ok()),
        transaction_id: str_at(resource, "/custom_id"),
    };
    let normalized = match event.event_type.as_str() {
        "PAYMENT.CAPTURE.COMPLETED" => {
            let txid = paypal_order.or(resource_id).ok_or_else(|| malformed("paypal", "The capture has no id"))?;
            let mut confirmation = GatewayConfirmation::new(gateway, txid).with_raw(resource.to_string());
            let amount = parse_amount(resource.pointer("/amount/value"));
            if let (Some(amount), Some(currency)) = (amount, str_at(resource, "/amount/currency_code")) {
                confirmation = confirmation.with_amount(amount, &currency);
            }
            NormalizedEvent::PaymentCompleted { reference, confirmation }
        },
        "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => {
            let reason = str_at(resource, "/status_details/reason").unwrap_or_else(|| "Capture denied".to_string());
            NormalizedEvent::PaymentFailed { reference, gateway, reason }
        },
        "CHECKOUT.ORDER.VOIDED" => NormalizedEvent::PaymentCancelled { reference, gateway },
        "CUSTOMER.DISPUTE.CREATED" => {
            let reference = OrderReference {
                gateway_transaction_id: str_at(resource, "/disputed_transactions/0/seller_transaction_id"),
                order_id: str_at(resource, "/disputed_transactions/0/invoice_number").and_then(|v| v.parse().ok()),
                transaction_id: str_at(resource, "/disputed_transactions/0/custom"),
            };
            let reason = str_at(resource, "/reason").unwrap_or_else(|| "unspecified".to_string());
            NormalizedEvent::DisputeCreated { reference, gateway, reason }
        },
        other => NormalizedEvent::Ignored { event_type: other.to_string() },
    };
    Ok(normalized)
}

//--------------------------------------        PayTabs        ---------------------------------------------------------
#[derive(Deserialize)]
struct PaytabsCallback {
    tran_ref: String,
    #[serde(default)]
    cart_id: Option<String>,
    cart_amount: Option<Value>,
    cart_currency: Option<String>,
    payment_result: PaytabsResult,
}

#[derive(Deserialize)]
struct PaytabsResult {
    response_status: String,
    response_message: Option<String>,
}

fn normalize_paytabs(value: Value) -> Result<NormalizedEvent, LifecycleError> {
    let raw = value.to_string();
    let callback: PaytabsCallback = serde_json::from_value(value).map_err(|e| malformed("paytabs", e))?;
    let gateway = GatewayKind::Paytabs;
    let reference = OrderReference {
        gateway_transaction_id: Some(callback.tran_ref.clone()),
        order_id: None,
        transaction_id: callback.cart_id.filter(|c| !c.trim().is_empty()),
    };
    let status = callback.payment_result.response_status.trim().to_ascii_uppercase();
    let normalized = match status.as_str() {
        // Authorised
        "A" => {
            let mut confirmation = GatewayConfirmation::new(gateway, callback.tran_ref).with_raw(raw);
            if let (Some(amount), Some(currency)) = (parse_amount(callback.cart_amount.as_ref()), callback.cart_currency)
            {
                confirmation = confirmation.with_amount(amount, &currency);
            }
            NormalizedEvent::PaymentCompleted { reference, confirmation }
        },
        // Declined or Error
        "D" | "E" => {
            let reason =
                callback.payment_result.response_message.unwrap_or_else(|| "The payment was declined".to_string());
            NormalizedEvent::PaymentFailed { reference, gateway, reason }
        },
        // Voided
        "V" => NormalizedEvent::PaymentCancelled { reference, gateway },
        other => NormalizedEvent::Ignored { event_type: format!("paytabs response status {other}") },
    };
    Ok(normalized)
}

//--------------------------------------       AfterShip       ---------------------------------------------------------
#[derive(Deserialize)]
struct AfterShipWebhook {
    msg: AfterShipMessage,
}

#[derive(Deserialize)]
struct AfterShipMessage {
    tracking_number: String,
    slug: Option<String>,
    #[serde(default)]
    checkpoints: Vec<AfterShipCheckpoint>,
}

/// Decodes an AfterShip tracking webhook. `carrier` (from the URL) is used when the payload has no slug.
pub fn normalize_carrier_payload(carrier: &str, body: &[u8]) -> Result<NormalizedEvent, LifecycleError> {
    let payload: AfterShipWebhook = serde_json::from_slice(body).map_err(|e| malformed("carrier", e))?;
    let msg = payload.msg;
    let events = msg
        .checkpoints
        .iter()
        .filter_map(AfterShipCheckpoint::to_checkpoint)
        .map(|c| c.into_event(EventSource::Webhook))
        .collect();
    Ok(NormalizedEvent::TrackingUpdated(CarrierUpdate {
        carrier: msg.slug.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| carrier.to_string()),
        tracking_number: msg.tracking_number,
        events,
    }))
}
