use std::time::Duration;

use actix_web::http::StatusCode;
use marketplace_engine::{
    db_types::{GatewayKind, PaymentMethod},
    integrations::{GatewayPaymentStatus, PaymentResult},
};
use serde_json::{json, Value};

use super::{
    helpers::{user_token, TestServer, BUYER, SELLER, STRANGER},
    mocks::{MockGatewayCalls, TestCarrier, TestGateway},
};

fn result(txid: &str, status: GatewayPaymentStatus) -> PaymentResult {
    PaymentResult {
        gateway_transaction_id: txid.to_string(),
        status,
        redirect_url: Some(format!("https://pay.example.com/{txid}")),
        raw: Value::Null,
    }
}

#[actix_web::test]
async fn standard_payment_is_confirmed() {
    let mut calls = MockGatewayCalls::new();
    calls
        .expect_process_payment()
        .withf(|req| req.gateway == GatewayKind::Stripe && req.buyer_id == BUYER)
        .times(1)
        .returning(|req| {
            Ok(result("pi_123", GatewayPaymentStatus::Succeeded { amount: Some(req.amount), currency: Some(req.currency) }))
        });
    let server = TestServer::with_upstreams(TestGateway::new(calls), TestCarrier::default()).await;
    let order = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;

    let (status, body) = server.post(&format!("/orders/{}/pay", order.id), &user_token(BUYER), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Payment confirmed");
    let data = &body["data"];
    assert_eq!(data["order"]["status"], "paid");
    assert_eq!(data["order"]["gatewayTransactionId"], "pi_123");
    assert_eq!(data["order"]["paymentCompleted"], true);
    assert_eq!(data["gatewayStatus"]["status"], "succeeded");
    assert_eq!(data["completion"]["alreadyProcessed"], false);

    // The seller now has something to ship
    let (status, body) = server.get("/fulfillments?status=awaiting_shipment", &user_token(SELLER)).await;
    assert_eq!(status, StatusCode::OK);
    let fulfillments = body["data"].as_array().unwrap();
    assert_eq!(fulfillments.len(), 1);
    assert_eq!(fulfillments[0]["orderId"], order.id);

    // Paying twice is refused
    let (status, _) = server.post(&format!("/orders/{}/pay", order.id), &user_token(BUYER), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn escrow_payment_holds_funds() {
    let mut calls = MockGatewayCalls::new();
    calls.expect_process_payment().times(1).returning(|req| {
        Ok(result("pi_esc", GatewayPaymentStatus::Succeeded { amount: Some(req.amount), currency: Some(req.currency) }))
    });
    let server = TestServer::with_upstreams(TestGateway::new(calls), TestCarrier::default()).await;
    let order = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Escrow).await;
    let (status, body) = server.post(&format!("/orders/{}/pay", order.id), &user_token(BUYER), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["order"]["status"], "funds_held");
}

#[actix_web::test]
async fn only_the_buyer_can_pay() {
    let server = TestServer::new().await;
    let order = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;
    let path = format!("/orders/{}/pay", order.id);
    let (status, _) = server.post(&path, &user_token(SELLER), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = server.post(&path, &user_token(STRANGER), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn pending_payment_is_settled_by_polling() {
    let mut calls = MockGatewayCalls::new();
    calls.expect_process_payment().times(1).returning(|_| Ok(result("pp_777", GatewayPaymentStatus::Pending)));
    calls
        .expect_verify_payment()
        .withf(|gateway, txid| *gateway == GatewayKind::Paypal && txid == "pp_777")
        .times(1)
        .returning(|_, _| {
            Ok(result("pp_777", GatewayPaymentStatus::Succeeded { amount: None, currency: None }))
        });
    let server = TestServer::with_upstreams(TestGateway::new(calls), TestCarrier::default()).await;
    let order = server.place_order("lamp", GatewayKind::Paypal, PaymentMethod::Standard).await;

    let (status, body) = server.post(&format!("/orders/{}/pay", order.id), &user_token(BUYER), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Payment pending at the gateway");
    assert_eq!(body["data"]["order"]["status"], "processing");
    assert_eq!(body["data"]["redirectUrl"], "https://pay.example.com/pp_777");

    // Strangers may not peek at the payment
    let path = format!("/payments/{}/status", order.id);
    let (status, _) = server.get(&path, &user_token(STRANGER)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server.get(&path, &user_token(BUYER)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["order"]["status"], "paid");
    assert_eq!(body["data"]["gatewayStatus"]["status"], "succeeded");

    // Once settled, the gateway is not asked again
    let (status, body) = server.get(&path, &user_token(SELLER)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["gatewayStatus"].is_null());
}

#[actix_web::test]
async fn declined_payment_can_be_retried() {
    let mut calls = MockGatewayCalls::new();
    let mut seq = mockall::Sequence::new();
    calls
        .expect_process_payment()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(result("pi_bad", GatewayPaymentStatus::Failed { reason: "card_declined".into() })));
    calls.expect_process_payment().times(1).in_sequence(&mut seq).returning(|req| {
        Ok(result("pi_good", GatewayPaymentStatus::Succeeded { amount: Some(req.amount), currency: Some(req.currency) }))
    });
    let server = TestServer::with_upstreams(TestGateway::new(calls), TestCarrier::default()).await;
    let order = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;
    let path = format!("/orders/{}/pay", order.id);

    let (status, body) = server.post(&path, &user_token(BUYER), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["order"]["status"], "payment_failed");
    assert!(body["message"].as_str().unwrap().contains("card_declined"));

    let (status, body) = server.post(&path, &user_token(BUYER), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["order"]["status"], "paid");
}

#[actix_web::test]
async fn gateway_timeout_is_service_unavailable() {
    // The mock is never reached: the call is abandoned while the gateway is still "thinking"
    let gateway = TestGateway::new(MockGatewayCalls::new()).with_delay(Duration::from_millis(500));
    let mut server = TestServer::with_upstreams(gateway, TestCarrier::default()).await;
    server.settings.gateway_timeout = Duration::from_millis(20);
    let order = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;

    let (status, body) = server.post(&format!("/orders/{}/pay", order.id), &user_token(BUYER), json!({})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{body}");
    assert!(body["message"].as_str().unwrap().contains("did not answer in time"), "{body}");

    let (_, body) = server.get(&format!("/orders/{}", order.id), &user_token(BUYER)).await;
    assert_eq!(body["data"]["order"]["status"], "pending");
}
