use std::str::FromStr;

use chrono::Utc;
use cucumber::{given, then, when};
use marketplace_engine::{
    db_types::{Actor, EventSource, GatewayKind, NewTrackingEvent, OrderStatus, PaymentMethod, ProductStatus, TrackingStatus},
    order_objects::CreateOrderRequest,
    payment_objects::GatewayConfirmation,
    tracking_objects::{CarrierUpdate, ConfirmDeliveryRequest, ShipOrderRequest},
    ProductCatalog,
    ReconciliationLog,
    TrackingManagement,
    WalletLedger,
};
use mkp_common::Money;

use crate::cucumber::{marketplace_world::error_kind, MarketplaceWorld};

fn money(s: &str) -> Money {
    Money::from_str(s).expect("Not a valid amount")
}

fn payment_method(s: &str) -> PaymentMethod {
    PaymentMethod::from_str(s).expect("Not a valid payment method")
}

fn ship_request(carrier: &str, tracking_number: &str) -> ShipOrderRequest {
    ShipOrderRequest {
        carrier: carrier.to_string(),
        tracking_number: tracking_number.to_string(),
        tracking_url: None,
        estimated_delivery: None,
    }
}

//-----------------------------------------------   Given   ----------------------------------------------------------

#[given(expr = "seller '{word}' lists product '{word}' for {word} USD with {word} shipping")]
async fn list_product(world: &mut MarketplaceWorld, seller: String, product: String, price: String, shipping: String) {
    world.system().add_product(&product, &seller, money(&price), money(&shipping)).await;
}

#[given(expr = "buyer '{word}' has ordered product '{word}' with {word} payment")]
async fn existing_order(world: &mut MarketplaceWorld, buyer: String, product: String, method: String) {
    let order = world.system().place_order(&buyer, &product, payment_method(&method)).await;
    world.order = Some(order);
}

#[given(expr = "the gateway has confirmed payment {string}")]
async fn existing_payment(world: &mut MarketplaceWorld, txid: String) {
    let confirmation = GatewayConfirmation::new(GatewayKind::Stripe, txid);
    let result = world.system().payments.complete_payment(world.order_id(), confirmation).await;
    world.completion = Some(result.expect("Error confirming payment"));
}

#[given(expr = "seller '{word}' has shipped the order with {word} tracking number {string}")]
async fn existing_shipment(world: &mut MarketplaceWorld, seller: String, carrier: String, number: String) {
    let result = world.system().tracking.mark_shipped(world.order_id(), &seller, ship_request(&carrier, &number)).await;
    world.tracking = Some(result.expect("Error shipping order"));
}

//-----------------------------------------------   When   -----------------------------------------------------------

#[when(expr = "buyer '{word}' orders product '{word}' with {word} payment")]
async fn place_order(world: &mut MarketplaceWorld, buyer: String, product: String, method: String) {
    let request = CreateOrderRequest {
        product_id: product,
        payment_method: payment_method(&method),
        gateway: GatewayKind::Stripe,
        shipping_address: crate::support::address(),
    };
    let result = world.system().orders.create_order(&buyer, request).await;
    if let Some(order) = world.record(result) {
        world.order = Some(order);
    }
}

#[when(expr = "the gateway confirms payment {string}")]
async fn confirm_payment(world: &mut MarketplaceWorld, txid: String) {
    let confirmation = GatewayConfirmation::new(GatewayKind::Stripe, txid);
    let result = world.system().payments.complete_payment(world.order_id(), confirmation).await;
    if let Some(completion) = world.record(result) {
        world.completion = Some(completion);
    }
}

#[when(expr = "the gateway confirms payment {string} of {word} {word}")]
async fn confirm_payment_with_amount(world: &mut MarketplaceWorld, txid: String, amount: String, currency: String) {
    let confirmation = GatewayConfirmation::new(GatewayKind::Stripe, txid).with_amount(money(&amount), &currency);
    let result = world.system().payments.complete_payment(world.order_id(), confirmation).await;
    if let Some(completion) = world.record(result) {
        world.completion = Some(completion);
    }
}

#[when(expr = "the gateway declines the payment with {string}")]
async fn decline_payment(world: &mut MarketplaceWorld, reason: String) {
    let result = world.system().payments.fail_payment(world.order_id(), GatewayKind::Stripe, &reason).await;
    world.record(result);
}

#[when(expr = "buyer '{word}' cancels the order")]
async fn buyer_cancels(world: &mut MarketplaceWorld, buyer: String) {
    let result = world.system().orders.cancel_order(world.order_id(), Actor::Buyer(buyer), None).await;
    world.record(result);
}

#[when(expr = "seller '{word}' ships the order with {word} tracking number {string}")]
async fn ship_order(world: &mut MarketplaceWorld, seller: String, carrier: String, number: String) {
    let result = world.system().tracking.mark_shipped(world.order_id(), &seller, ship_request(&carrier, &number)).await;
    if let Some(tracking) = world.record(result) {
        world.tracking = Some(tracking);
    }
}

#[when(expr = "buyer '{word}' confirms delivery with rating {int}")]
async fn confirm_delivery(world: &mut MarketplaceWorld, buyer: String, rating: i64) {
    let request = ConfirmDeliveryRequest { rating: Some(rating), ..Default::default() };
    let result = world.system().tracking.confirm_delivery(world.tracking_id(), &buyer, request).await;
    if let Some(tracking) = world.record(result) {
        world.tracking = Some(tracking);
    }
}

#[when(expr = "the carrier reports the shipment as {word}")]
async fn carrier_update(world: &mut MarketplaceWorld, status: String) {
    let status = TrackingStatus::from_str(&status).expect("Not a valid tracking status");
    let tracking = world.tracking.clone().expect("The order has not shipped");
    let update = CarrierUpdate {
        carrier: tracking.carrier.clone(),
        tracking_number: tracking.tracking_number.clone(),
        events: vec![NewTrackingEvent {
            timestamp: Utc::now(),
            status,
            description: format!("Carrier reports {status}"),
            location: Some("Riyadh hub".to_string()),
            source: EventSource::Webhook,
        }],
    };
    let result = world.system().tracking.handle_carrier_update(update).await;
    if let Some(ingested) = world.record(result) {
        world.tracking = Some(ingested.tracking);
    }
}

#[when(expr = "admin '{word}' moves the order to {word}")]
async fn admin_moves(world: &mut MarketplaceWorld, admin: String, status: String) {
    let target = OrderStatus::from_str(&status).expect("Not a valid order status");
    let result = world.system().orders.admin_transition(world.order_id(), &admin, target, None).await;
    world.record(result);
}

#[when(expr = "buyer '{word}' raises a dispute: {string}")]
async fn raise_dispute(world: &mut MarketplaceWorld, buyer: String, reason: String) {
    let result = world.system().orders.raise_dispute(world.order_id(), &buyer, &reason).await;
    world.record(result);
}

//-----------------------------------------------   Then   -----------------------------------------------------------

#[then(expr = "the order total is {word}")]
async fn order_total(world: &mut MarketplaceWorld, total: String) {
    let order = world.current_order().await;
    assert_eq!(order.amounts.total_amount, money(&total), "Order total is incorrect");
}

#[then(expr = "the seller payout is {word}")]
async fn seller_payout(world: &mut MarketplaceWorld, payout: String) {
    let order = world.current_order().await;
    assert_eq!(order.amounts.seller_payout, money(&payout), "Seller payout is incorrect");
}

#[then(expr = "the order status is {word}")]
async fn order_status(world: &mut MarketplaceWorld, status: String) {
    let expected = OrderStatus::from_str(&status).expect("Not a valid order status");
    let order = world.current_order().await;
    assert_eq!(order.status, expected);
}

#[then("the request succeeds")]
async fn request_succeeds(world: &mut MarketplaceWorld) {
    assert!(world.error.is_none(), "Unexpected error: {:?}", world.error);
}

#[then(expr = "the request fails with a(n) {word} error")]
async fn request_fails(world: &mut MarketplaceWorld, kind: String) {
    let err = world.error.as_ref().expect("The request did not fail");
    assert_eq!(error_kind(err), kind, "Unexpected error: {err}");
}

#[then("the payment was already processed")]
async fn already_processed(world: &mut MarketplaceWorld) {
    let completion = world.completion.as_ref().expect("No payment has been confirmed");
    assert!(completion.already_processed);
}

#[then("the payment was processed with warnings")]
async fn processed_with_warnings(world: &mut MarketplaceWorld) {
    let completion = world.completion.as_ref().expect("No payment has been confirmed");
    assert!(!completion.already_processed);
    assert!(completion.has_warnings());
}

#[then(expr = "seller '{word}' has {int} wallet credit(s) totalling {word}")]
async fn wallet_credits(world: &mut MarketplaceWorld, seller: String, count: usize, total: String) {
    let credits = world.system().db.fetch_wallet_credits(&seller).await.expect("Error fetching credits");
    assert_eq!(credits.len(), count);
    let sum = credits.iter().map(|c| c.amount).sum::<Money>();
    assert_eq!(sum, money(&total));
}

#[then(expr = "product '{word}' is {word}")]
async fn product_status(world: &mut MarketplaceWorld, product: String, status: String) {
    let expected = ProductStatus::from_str(&status).expect("Not a valid product status");
    let product = world.system().db.fetch_product(&product).await.expect("Error fetching product");
    assert_eq!(product.expect("Product does not exist").status, expected);
}

#[then(expr = "the order is flagged for {word}")]
async fn flagged(world: &mut MarketplaceWorld, kind: String) {
    let flags = world.system().db.fetch_flags_for_order(world.order_id()).await.expect("Error fetching flags");
    assert!(flags.iter().any(|f| f.step.to_string() == kind), "No {kind} flag in {flags:?}");
}

#[then("the order has no reconciliation flags")]
async fn not_flagged(world: &mut MarketplaceWorld) {
    let flags = world.system().db.fetch_flags_for_order(world.order_id()).await.expect("Error fetching flags");
    assert!(flags.is_empty(), "Unexpected flags: {flags:?}");
}

#[then(expr = "the delivery was confirmed by the {word} with rating {int}")]
async fn delivery_confirmation(world: &mut MarketplaceWorld, confirmer: String, rating: i64) {
    let db = &world.system().db;
    let tracking = db.fetch_tracking(world.tracking_id()).await.expect("Error fetching tracking");
    let confirmation = tracking.expect("Tracking has disappeared").delivery_confirmation;
    assert!(confirmation.is_delivered);
    assert_eq!(confirmation.confirmed_by.map(|c| c.to_string()), Some(confirmer));
    assert_eq!(confirmation.rating, Some(rating));
}

#[then(expr = "the shipment has {int} tracking event(s)")]
async fn tracking_events(world: &mut MarketplaceWorld, count: usize) {
    let db = &world.system().db;
    let events = db.fetch_tracking_events(world.tracking_id()).await.expect("Error fetching events");
    assert_eq!(events.len(), count);
}

#[then(expr = "the dispute reason is {string}")]
async fn dispute_reason(world: &mut MarketplaceWorld, reason: String) {
    let order = world.current_order().await;
    assert_eq!(order.dispute_reason.as_deref(), Some(reason.as_str()));
    assert!(order.dispute_raised_at.is_some());
}
