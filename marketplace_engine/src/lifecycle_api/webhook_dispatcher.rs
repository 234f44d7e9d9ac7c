use std::fmt::Debug;

use chrono::Utc;
use log::*;
use mkp_common::Secret;

use crate::{
    db_types::{GatewayKind, Order},
    errors::LifecycleError,
    helpers::{verify_base64_signature, verify_hex_signature, verify_stripe_signature, SignatureError},
    integrations::{CarrierClient, PaymentGateway},
    lifecycle_api::{
        payment_coordinator::PaymentCoordinator,
        tracking_api::TrackingApi,
        webhook_objects::{NormalizedEvent, OrderReference, WebhookOutcome},
        webhook_payloads::{normalize_carrier_payload, normalize_gateway_payload},
    },
    traits::{OrderManagement, ProductCatalog, ReconciliationLog, TrackingManagement, WalletLedger},
};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
pub const PAYPAL_SIGNATURE_HEADER: &str = "paypal-transmission-sig";
pub const PAYTABS_SIGNATURE_HEADER: &str = "signature";
pub const CARRIER_SIGNATURE_HEADER: &str = "aftership-hmac-sha256";

/// The header carrying the signature for webhooks from `gateway`.
pub fn signature_header(gateway: GatewayKind) -> &'static str {
    match gateway {
        GatewayKind::Stripe => STRIPE_SIGNATURE_HEADER,
        GatewayKind::Paypal => PAYPAL_SIGNATURE_HEADER,
        GatewayKind::Paytabs => PAYTABS_SIGNATURE_HEADER,
    }
}

/// Shared secrets for webhook verification.
///
/// A source without a secret is rejected unless `allow_unsigned` is set, which is meant for local development only.
#[derive(Debug, Clone, Default)]
pub struct WebhookSecrets {
    pub stripe: Option<Secret<String>>,
    pub paypal: Option<Secret<String>>,
    pub paytabs: Option<Secret<String>>,
    pub carrier: Option<Secret<String>>,
    pub allow_unsigned: bool,
}

impl WebhookSecrets {
    pub fn for_gateway(&self, gateway: GatewayKind) -> Option<&Secret<String>> {
        match gateway {
            GatewayKind::Stripe => self.stripe.as_ref(),
            GatewayKind::Paypal => self.paypal.as_ref(),
            GatewayKind::Paytabs => self.paytabs.as_ref(),
        }
    }
}

/// Single ingress for asynchronous gateway and carrier events.
///
/// Each webhook is verified, decoded into a [`NormalizedEvent`], matched to an order, and handed to the payment
/// coordinator or the tracking API. The dispatcher never writes order or tracking state itself.
pub struct WebhookDispatcher<B, G, C> {
    db: B,
    payments: PaymentCoordinator<B, G>,
    tracking: TrackingApi<B, C>,
    secrets: WebhookSecrets,
}

impl<B, G, C> Debug for WebhookDispatcher<B, G, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookDispatcher (unsigned allowed: {})", self.secrets.allow_unsigned)
    }
}

impl<B, G, C> WebhookDispatcher<B, G, C> {
    pub fn new(db: B, payments: PaymentCoordinator<B, G>, tracking: TrackingApi<B, C>, secrets: WebhookSecrets) -> Self {
        Self { db, payments, tracking, secrets }
    }
}

impl<B, G, C> WebhookDispatcher<B, G, C>
where
    B: OrderManagement + TrackingManagement + ProductCatalog + WalletLedger + ReconciliationLog,
    G: PaymentGateway,
    C: CarrierClient,
{
    fn verify<F>(&self, source: &str, secret: Option<&Secret<String>>, check: F) -> Result<(), LifecycleError>
    where F: FnOnce(&str) -> Result<(), SignatureError> {
        match secret {
            Some(secret) => check(secret.reveal()).map_err(|e| {
                warn!("🪝️ Rejected {source} webhook: {e}");
                LifecycleError::Unauthorized(format!("{source}: {e}"))
            }),
            None if self.secrets.allow_unsigned => {
                warn!("🪝️ No {source} webhook secret is configured. Accepting the payload without verification");
                Ok(())
            },
            None => {
                warn!("🪝️ Rejected {source} webhook: no secret is configured and unsigned webhooks are not allowed");
                Err(LifecycleError::Unauthorized(format!("No {source} webhook secret is configured")))
            },
        }
    }

    /// Handles `POST /payments/webhook/{gateway}`.
    pub async fn handle_gateway_webhook(
        &self,
        gateway: GatewayKind,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, LifecycleError> {
        let secret = self.secrets.for_gateway(gateway);
        match gateway {
            GatewayKind::Stripe => self.verify(gateway.as_str(), secret, |s| {
                verify_stripe_signature(s, signature, body, Utc::now().timestamp())
            })?,
            GatewayKind::Paypal | GatewayKind::Paytabs => {
                self.verify(gateway.as_str(), secret, |s| verify_hex_signature(s, body, signature))?
            },
        }
        let event = normalize_gateway_payload(gateway, body)?;
        debug!("🪝️ {gateway} webhook decoded as {}", event.event_type());
        self.dispatch(event).await
    }

    /// Handles `POST /tracking/webhook/{carrier}`.
    pub async fn handle_carrier_webhook(
        &self,
        carrier: &str,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, LifecycleError> {
        self.verify("carrier", self.secrets.carrier.as_ref(), |s| verify_base64_signature(s, body, signature))?;
        let event = normalize_carrier_payload(carrier, body)?;
        self.dispatch(event).await
    }

    /// Routes a decoded event to the component that owns it.
    pub async fn dispatch(&self, event: NormalizedEvent) -> Result<WebhookOutcome, LifecycleError> {
        let event_type = event.event_type().to_string();
        match event {
            NormalizedEvent::Ignored { event_type: original } => {
                info!("🪝️ Ignoring webhook event {original}");
                Ok(WebhookOutcome::new(&event_type, None, format!("Event {original} is not handled")))
            },
            NormalizedEvent::PaymentCompleted { reference, confirmation } => {
                let order = self.resolve_order(&reference).await?;
                let result = self.payments.complete_payment(order.id, confirmation).await?;
                let message = if result.already_processed {
                    "Payment was already processed"
                } else if result.has_warnings() {
                    "Payment processed with warnings"
                } else {
                    "Payment processed"
                };
                Ok(WebhookOutcome::new(&event_type, Some(result.order.transaction_id), message))
            },
            NormalizedEvent::PaymentFailed { reference, gateway, reason } => {
                let order = self.resolve_order(&reference).await?;
                let order = self.payments.fail_payment(order.id, gateway, &reason).await?;
                let message = format!("Order is {}", order.status);
                Ok(WebhookOutcome::new(&event_type, Some(order.transaction_id), message))
            },
            NormalizedEvent::PaymentCancelled { reference, gateway } => {
                let order = self.resolve_order(&reference).await?;
                let order = self.payments.cancel_payment(order.id, gateway).await?;
                let message = format!("Order is {}", order.status);
                Ok(WebhookOutcome::new(&event_type, Some(order.transaction_id), message))
            },
            NormalizedEvent::DisputeCreated { reference, gateway, reason } => {
                let order = self.resolve_order(&reference).await?;
                let order = self.payments.record_dispute(order.id, gateway, &reason).await?;
                Ok(WebhookOutcome::new(&event_type, Some(order.transaction_id), "Dispute recorded"))
            },
            NormalizedEvent::TrackingUpdated(update) => {
                let result = self.tracking.handle_carrier_update(update).await?;
                let transaction_id =
                    self.db.fetch_order(result.tracking.order_id).await?.map(|o| o.transaction_id);
                let message =
                    format!("{} new tracking events recorded, {} duplicates dropped", result.appended, result.duplicates);
                Ok(WebhookOutcome::new(&event_type, transaction_id, message))
            },
        }
    }

    /// Gateway transaction id first, then the order id or transaction id the payload carries in its metadata.
    async fn resolve_order(&self, reference: &OrderReference) -> Result<Order, LifecycleError> {
        if let Some(txid) = &reference.gateway_transaction_id {
            if let Some(order) = self.db.fetch_order_by_gateway_transaction_id(txid).await? {
                return Ok(order);
            }
        }
        if let Some(id) = reference.order_id {
            if let Some(order) = self.db.fetch_order(id).await? {
                return Ok(order);
            }
        }
        if let Some(txid) = &reference.transaction_id {
            if let Some(order) = self.db.fetch_order_by_transaction_id(txid).await? {
                return Ok(order);
            }
        }
        warn!("🪝️ No order matches webhook reference ({reference})");
        Err(LifecycleError::OrderNotFound(reference.to_string()))
    }
}
