use actix_web::http::StatusCode;
use chrono::{Duration, Utc};
use marketplace_engine::{
    db_types::{GatewayKind, PaymentMethod, TrackingStatus},
    integrations::CarrierCheckpoint,
};
use serde_json::{json, Value};

use super::{
    helpers::{user_token, TestServer, BUYER, SELLER, STRANGER},
    mocks::{MockCarrierCalls, TestCarrier, TestGateway},
};

fn shipment() -> Value {
    json!({ "carrier": "DHL Express", "trackingNumber": "12345 67890", "trackingUrl": "https://dhl.example.com/1234567890" })
}

/// Ships a freshly paid order and returns (order id, tracking id).
async fn shipped(server: &TestServer) -> (i64, i64) {
    let order = server.paid_order("lamp").await;
    let (status, body) = server.post(&format!("/orders/{}/ship", order.id), &user_token(SELLER), shipment()).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (order.id, body["data"]["id"].as_i64().unwrap())
}

#[actix_web::test]
async fn seller_ships_a_paid_order() {
    let server = TestServer::new().await;
    let order = server.paid_order("lamp").await;
    let path = format!("/orders/{}/ship", order.id);

    let (status, _) = server.post(&path, &user_token(BUYER), shipment()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server.post(&path, &user_token(SELLER), shipment()).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let tracking = &body["data"];
    assert_eq!(tracking["carrier"], "dhl");
    assert_eq!(tracking["trackingNumber"], "1234567890");
    assert_eq!(tracking["isActive"], true);

    let (status, body) = server.post(&path, &user_token(SELLER), shipment()).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = server.get(&format!("/orders/{}", order.id), &user_token(BUYER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order"]["status"], "shipped");
    assert_eq!(body["data"]["tracking"]["trackingNumber"], "1234567890");

    let (_, body) = server.get("/fulfillments?status=shipped", &user_token(SELLER)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn unpaid_orders_and_bad_numbers_cannot_ship() {
    let server = TestServer::new().await;
    let unpaid = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;
    let (status, body) = server.post(&format!("/orders/{}/ship", unpaid.id), &user_token(SELLER), shipment()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("confirmed payment"), "{body}");

    let paid = server.paid_order("chair").await;
    let bad_number = json!({ "carrier": "ups", "trackingNumber": "12345" });
    let (status, body) = server.post(&format!("/orders/{}/ship", paid.id), &user_token(SELLER), bad_number).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("not a valid ups tracking number"), "{body}");
}

#[actix_web::test]
async fn tracking_is_visible_to_participants() {
    let server = TestServer::new().await;
    let (order_id, tracking_id) = shipped(&server).await;

    let (status, body) = server.get(&format!("/tracking/{tracking_id}"), &user_token(BUYER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tracking"]["orderId"], order_id);
    assert_eq!(body["data"]["events"].as_array().unwrap().len(), 1);

    let (status, body) = server.get(&format!("/orders/{order_id}/tracking"), &user_token(SELLER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tracking"]["id"], tracking_id);

    let (status, _) = server.get(&format!("/tracking/{tracking_id}"), &user_token(STRANGER)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = server.get("/tracking/424242", &user_token(BUYER)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn seller_adds_manual_updates() {
    let server = TestServer::new().await;
    let (order_id, tracking_id) = shipped(&server).await;
    let path = format!("/tracking/{tracking_id}/events");
    let update = json!({ "status": "in_transit", "description": "Left the Riyadh hub", "location": "Riyadh" });

    let (status, _) = server.post(&path, &user_token(BUYER), update.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server.post(&path, &user_token(SELLER), update).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "in_transit");

    let (_, body) = server.get(&format!("/orders/{order_id}"), &user_token(BUYER)).await;
    assert_eq!(body["data"]["order"]["status"], "in_transit");
}

#[actix_web::test]
async fn buyer_confirms_delivery() {
    let server = TestServer::new().await;
    let (order_id, tracking_id) = shipped(&server).await;
    let path = format!("/tracking/{tracking_id}/confirm-delivery");

    let (status, _) = server.post(&path, &user_token(SELLER), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = server.post(&path, &user_token(BUYER), json!({ "rating": 9 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let confirmation = json!({ "rating": 5, "feedback": "Arrived well packed" });
    let (status, body) = server.post(&path, &user_token(BUYER), confirmation.clone()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "delivered");

    let (_, body) = server.get(&format!("/orders/{order_id}"), &user_token(BUYER)).await;
    assert_eq!(body["data"]["order"]["status"], "completed");

    // A repeat confirmation changes nothing
    let (status, _) = server.post(&path, &user_token(BUYER), confirmation).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = server.get(&format!("/orders/{order_id}/history"), &user_token(BUYER)).await;
    let completions = body["data"].as_array().unwrap().iter().filter(|e| e["status"] == "completed").count();
    assert_eq!(completions, 1);
}

#[actix_web::test]
async fn sync_pulls_new_carrier_events() {
    let now = Utc::now();
    let checkpoints = vec![
        CarrierCheckpoint {
            timestamp: now - Duration::hours(5),
            status: TrackingStatus::InTransit,
            description: "Departed facility".to_string(),
            location: Some("Dammam".to_string()),
        },
        CarrierCheckpoint {
            timestamp: now - Duration::hours(1),
            status: TrackingStatus::OutForDelivery,
            description: "With courier".to_string(),
            location: Some("Riyadh".to_string()),
        },
    ];
    let mut calls = MockCarrierCalls::new();
    calls
        .expect_fetch_checkpoints()
        .withf(|carrier, number| carrier == "dhl" && number == "1234567890")
        .times(2)
        .returning(move |_, _| Ok(checkpoints.clone()));
    let server = TestServer::with_upstreams(TestGateway::default(), TestCarrier::new(calls)).await;
    let (order_id, tracking_id) = shipped(&server).await;
    let path = format!("/tracking/{tracking_id}/sync");

    let (status, _) = server.post(&path, &user_token(STRANGER), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server.post(&path, &user_token(BUYER), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["appended"], 2);
    assert_eq!(body["data"]["tracking"]["status"], "out_for_delivery");

    // The carrier repeats itself; nothing new is recorded
    let (status, body) = server.post(&path, &user_token(SELLER), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["appended"], 0);
    assert_eq!(body["data"]["duplicates"], 2);

    let (_, body) = server.get(&format!("/orders/{order_id}"), &user_token(BUYER)).await;
    assert_eq!(body["data"]["order"]["status"], "out_for_delivery");
}
