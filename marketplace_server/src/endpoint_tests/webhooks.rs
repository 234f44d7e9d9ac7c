use actix_web::{http::StatusCode, test::TestRequest};
use chrono::{Duration, Utc};
use marketplace_engine::{
    db_types::{GatewayKind, PaymentMethod},
    helpers::{sign_base64, sign_hex, sign_stripe_payload},
    WebhookSecrets,
    CARRIER_SIGNATURE_HEADER,
    PAYPAL_SIGNATURE_HEADER,
    STRIPE_SIGNATURE_HEADER,
};
use mkp_common::Secret;
use serde_json::{json, Value};

use super::helpers::{user_token, TestServer, BUYER, SELLER};

const PAYPAL_SECRET: &str = "paypal-webhook-test-secret";
const STRIPE_SECRET: &str = "whsec_stripe_test_secret";
const CARRIER_SECRET: &str = "aftership-test-secret";

async fn signed_server() -> TestServer {
    let mut server = TestServer::new().await;
    server.settings.webhooks = WebhookSecrets {
        stripe: Some(Secret::new(STRIPE_SECRET.to_string())),
        paypal: Some(Secret::new(PAYPAL_SECRET.to_string())),
        paytabs: None,
        carrier: Some(Secret::new(CARRIER_SECRET.to_string())),
        allow_unsigned: false,
    };
    server
}

fn webhook(path: &str, header: Option<(&str, String)>, body: &[u8]) -> TestRequest {
    let req = TestRequest::post()
        .uri(path)
        .insert_header(("content-type", "application/json"))
        .set_payload(body.to_vec());
    match header {
        Some(h) => req.insert_header(h),
        None => req,
    }
}

fn paypal_capture(order_id: i64) -> Vec<u8> {
    json!({
        "id": "WH-1",
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": { "id": "CAPTURE-1", "invoice_id": order_id.to_string(), "status": "COMPLETED" }
    })
    .to_string()
    .into_bytes()
}

#[actix_web::test]
async fn signed_paypal_capture_completes_the_order() {
    let server = signed_server().await;
    let order = server.place_order("lamp", GatewayKind::Paypal, PaymentMethod::Standard).await;
    let body = paypal_capture(order.id);
    let signature = sign_hex(PAYPAL_SECRET, &body).unwrap();

    let req = webhook("/payments/webhook/paypal", Some((PAYPAL_SIGNATURE_HEADER, signature.clone())), &body);
    let (status, outcome) = server.send(req).await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["eventType"], "payment_completed");
    assert_eq!(outcome["transactionId"], order.transaction_id.as_str());
    assert_eq!(outcome["message"], "Payment processed");

    // PayPal retries: the second delivery is acknowledged without doing anything
    let req = webhook("/payments/webhook/paypal", Some((PAYPAL_SIGNATURE_HEADER, signature)), &body);
    let (status, outcome) = server.send(req).await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["message"], "Payment was already processed");

    let (_, body) = server.get(&format!("/orders/{}", order.id), &user_token(BUYER)).await;
    assert_eq!(body["data"]["order"]["status"], "paid");
    let (_, body) = server.get("/fulfillments", &user_token(SELLER)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn signed_stripe_failure_is_recorded() {
    let server = signed_server().await;
    let order = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;
    let body = json!({
        "id": "evt_9",
        "type": "payment_intent.payment_failed",
        "data": { "object": {
            "id": "pi_9",
            "metadata": { "orderId": order.id.to_string() },
            "last_payment_error": { "message": "Your card was declined." }
        }}
    })
    .to_string()
    .into_bytes();
    let header = sign_stripe_payload(STRIPE_SECRET, Utc::now().timestamp(), &body).unwrap();
    let (status, outcome) =
        server.send(webhook("/payments/webhook/stripe", Some((STRIPE_SIGNATURE_HEADER, header)), &body)).await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["eventType"], "payment_failed");
    assert_eq!(outcome["message"], "Order is payment_failed");
}

#[actix_web::test]
async fn bad_signatures_are_rejected() {
    let server = signed_server().await;
    let order = server.place_order("lamp", GatewayKind::Paypal, PaymentMethod::Standard).await;
    let body = paypal_capture(order.id);

    let (status, outcome) = server.send(webhook("/payments/webhook/paypal", None, &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{outcome}");

    let forged = sign_hex("someone-elses-secret", &body).unwrap();
    let req = webhook("/payments/webhook/paypal", Some((PAYPAL_SIGNATURE_HEADER, forged)), &body);
    let (status, outcome) = server.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{outcome}");
    assert_eq!(outcome["success"], false);

    // Nothing changed
    let (_, body) = server.get(&format!("/orders/{}", order.id), &user_token(BUYER)).await;
    assert_eq!(body["data"]["order"]["status"], "pending");
}

#[actix_web::test]
async fn unsigned_webhooks_need_explicit_opt_in() {
    let mut server = TestServer::new().await;
    let order = server.place_order("lamp", GatewayKind::Paypal, PaymentMethod::Standard).await;
    let body = paypal_capture(order.id);

    let (status, _) = server.send(webhook("/payments/webhook/paypal", None, &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    server.settings.webhooks.allow_unsigned = true;
    let (status, outcome) = server.send(webhook("/payments/webhook/paypal", None, &body)).await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["eventType"], "payment_completed");
}

#[actix_web::test]
async fn unknown_gateways_events_and_orders() {
    let mut server = TestServer::new().await;
    server.settings.webhooks.allow_unsigned = true;

    let (status, _) = server.send(webhook("/payments/webhook/bitpay", None, b"{}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let ignored = json!({ "event_type": "BILLING.PLAN.CREATED", "resource": {} }).to_string();
    let (status, outcome) = server.send(webhook("/payments/webhook/paypal", None, ignored.as_bytes())).await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["eventType"], "ignored");

    let (status, _) = server.send(webhook("/payments/webhook/paypal", None, &paypal_capture(31337))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, outcome) = server.send(webhook("/payments/webhook/paypal", None, b"not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{outcome}");
}

#[actix_web::test]
async fn carrier_webhook_delivers_the_order() {
    let server = signed_server().await;
    let order = server.paid_order("lamp").await;
    let ship = json!({ "carrier": "dhl", "trackingNumber": "1234567890" });
    let (status, _) = server.post(&format!("/orders/{}/ship", order.id), &user_token(SELLER), ship).await;
    assert_eq!(status, StatusCode::CREATED);

    let at = |hours: i64| (Utc::now() - Duration::hours(hours)).to_rfc3339();
    let body: Value = json!({
        "event": "tracking_update",
        "msg": {
            "tracking_number": "1234567890",
            "slug": "dhl",
            "checkpoints": [
                { "checkpoint_time": at(3), "message": "Arrived at facility", "tag": "InTransit" },
                {
                    "checkpoint_time": at(1),
                    "message": "Delivered to front desk",
                    "tag": "Delivered",
                    "location": "Riyadh"
                }
            ]
        }
    });
    let body = body.to_string().into_bytes();
    let signature = sign_base64(CARRIER_SECRET, &body).unwrap();
    let req = webhook("/tracking/webhook/dhl", Some((CARRIER_SIGNATURE_HEADER, signature)), &body);
    let (status, outcome) = server.send(req).await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["eventType"], "tracking_updated");
    assert_eq!(outcome["transactionId"], order.transaction_id.as_str());

    // Carrier delivery is not a buyer confirmation: the order waits in `delivered`
    let (_, body) = server.get(&format!("/orders/{}", order.id), &user_token(BUYER)).await;
    assert_eq!(body["data"]["order"]["status"], "delivered");
    assert_eq!(body["data"]["tracking"]["status"], "delivered");

    let (status, _) = server.send(webhook("/tracking/webhook/dhl", None, b"{}")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
