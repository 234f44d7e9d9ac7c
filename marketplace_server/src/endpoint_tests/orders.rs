use actix_web::{http::StatusCode, test::TestRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use marketplace_engine::db_types::{GatewayKind, PaymentMethod};
use serde_json::json;

use super::helpers::{address_json, user_token, TestServer, BUYER, SELLER, STRANGER, TEST_SECRET};
use crate::auth::{JwtClaims, Role};

#[actix_web::test]
async fn health_check_needs_no_token() {
    let server = TestServer::new().await;
    let (status, _) = server.send(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn requests_without_a_token_are_rejected() {
    let server = TestServer::new().await;
    let (status, body) = server.send(TestRequest::get().uri("/orders")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("No bearer token"), "{body}");
}

#[actix_web::test]
async fn expired_and_forged_tokens_are_rejected() {
    let server = TestServer::new().await;
    let claims = JwtClaims { sub: BUYER.into(), roles: vec![Role::User], exp: (Utc::now() - Duration::hours(2)).timestamp() };
    let expired = encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_SECRET.as_bytes())).unwrap();
    let (status, body) = server.get("/orders", &expired).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("expired"), "{body}");

    let claims = JwtClaims { exp: (Utc::now() + Duration::hours(2)).timestamp(), ..claims };
    let forged = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"not-the-server-secret")).unwrap();
    let (status, _) = server.get("/orders", &forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn create_order_prices_from_the_catalog() {
    let server = TestServer::new().await;
    server.add_product("lamp", 100).await;
    let body = json!({
        "productId": "lamp",
        "gateway": "stripe",
        "shippingAddress": address_json(),
        "price": 1
    });
    let (status, body) = server.post("/orders", &user_token(BUYER), body).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    let order = &body["data"];
    assert_eq!(order["status"], "pending");
    assert_eq!(order["buyerId"], BUYER);
    assert_eq!(order["sellerId"], SELLER);
    assert_eq!(order["paymentMethod"], "standard");
    assert_eq!(order["amounts"]["productPrice"], 10_000);
    assert_eq!(order["amounts"]["shippingCost"], 500);
}

#[actix_web::test]
async fn create_order_validates_its_input() {
    let server = TestServer::new().await;
    server.add_product("lamp", 100).await;
    let token = user_token(BUYER);

    let missing = json!({ "productId": "nope", "gateway": "stripe", "shippingAddress": address_json() });
    let (status, body) = server.post("/orders", &token, missing).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("does not exist"), "{body}");

    let no_address = json!({ "productId": "lamp", "gateway": "stripe" });
    let (status, body) = server.post("/orders", &token, no_address).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("fullName"), "{body}");

    let bad_gateway = json!({ "productId": "lamp", "gateway": "bitcoin", "shippingAddress": address_json() });
    let (status, body) = server.post("/orders", &token, bad_gateway).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = server.post("/orders", &user_token(SELLER), json!({
        "productId": "lamp", "gateway": "stripe", "shippingAddress": address_json()
    })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn orders_are_listed_for_participants_only() {
    let server = TestServer::new().await;
    let order = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;

    let (status, body) = server.get("/orders", &user_token(BUYER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = server.get("/orders", &user_token(SELLER)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = server.get("/orders?status=paid", &user_token(BUYER)).await;
    assert!(body["data"].as_array().unwrap().is_empty());
    let (_, body) = server.get("/orders", &user_token(STRANGER)).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let path = format!("/orders/{}", order.id);
    let (status, body) = server.get(&path, &user_token(SELLER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order"]["id"], order.id);
    assert!(body["data"]["tracking"].is_null());
    let (status, _) = server.get(&path, &user_token(STRANGER)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = server.get("/orders/999999", &user_token(BUYER)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn bad_status_filter_is_a_bad_request() {
    let server = TestServer::new().await;
    let (status, body) = server.get("/orders?status=lost_at_sea", &user_token(BUYER)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn buyer_cancels_before_payment() {
    let server = TestServer::new().await;
    let order = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;
    let path = format!("/orders/{}/cancel", order.id);

    let (status, _) = server.post(&path, &user_token(STRANGER), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server.post(&path, &user_token(BUYER), json!({ "reason": "Changed my mind" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "cancelled");

    // Cancelling twice is harmless
    let (status, body) = server.send(super::helpers::with_token(
        TestRequest::post().uri(&path),
        &user_token(BUYER),
    ))
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "cancelled");

    let (status, body) = server.get(&format!("/orders/{}/history", order.id), &user_token(BUYER)).await;
    assert_eq!(status, StatusCode::OK);
    let history = body["data"].as_array().unwrap();
    let last = history.last().unwrap();
    assert_eq!(last["status"], "cancelled");
    assert_eq!(last["note"], "Changed my mind");
}

#[actix_web::test]
async fn paid_orders_cannot_be_cancelled_by_the_buyer() {
    let server = TestServer::new().await;
    let order = server.paid_order("lamp").await;
    let (status, body) = server.post(&format!("/orders/{}/cancel", order.id), &user_token(BUYER), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("administrator"), "{body}");
}

#[actix_web::test]
async fn disputes_need_a_paid_order() {
    let server = TestServer::new().await;
    let order = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;
    let path = format!("/orders/{}/dispute", order.id);
    let (status, _) = server.post(&path, &user_token(BUYER), json!({ "reason": "Never arrived" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let order = server.paid_order("chair").await;
    let path = format!("/orders/{}/dispute", order.id);
    let (status, _) = server.post(&path, &user_token(SELLER), json!({ "reason": "x" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = server.post(&path, &user_token(BUYER), json!({ "reason": "Never arrived" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "disputed");
    assert_eq!(body["data"]["disputeReason"], "Never arrived");
}
