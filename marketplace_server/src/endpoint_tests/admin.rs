use actix_web::http::StatusCode;
use marketplace_engine::{
    db_types::{GatewayKind, OrderStatus, PaymentMethod, ReconciliationStep},
    events::EventProducers,
    integrations::SimulatedGateway,
    payment_objects::GatewayConfirmation,
    OrderManagement,
    PaymentCoordinator,
    ReconciliationLog,
    TrackingManagement,
    WalletLedger,
};
use serde_json::json;

use super::helpers::{admin_token, user_token, TestServer, BUYER, SELLER};

#[actix_web::test]
async fn admin_routes_need_the_admin_role() {
    let server = TestServer::new().await;
    let (status, body) = server.get("/admin/reconciliation", &user_token(SELLER)).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    let (status, _) = server.post("/admin/orders/1/status", &user_token(BUYER), json!({ "status": "cancelled" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = server.post("/admin/reconciliation/1/resolve", &user_token(BUYER), json!({ "note": "x" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn reconciliation_flags_are_listed_and_resolved() {
    let server = TestServer::new().await;
    let first = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;
    let second = server.place_order("chair", GatewayKind::Paytabs, PaymentMethod::Standard).await;
    let flag = server
        .db
        .flag_for_reconciliation(first.id, ReconciliationStep::WalletCredit, "Seller wallet was not credited")
        .await
        .unwrap();
    server
        .db
        .flag_for_reconciliation(second.id, ReconciliationStep::ProductStatus, "Product still listed")
        .await
        .unwrap();

    let (status, body) = server.get("/admin/reconciliation", &admin_token()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let flags = body["data"].as_array().unwrap();
    assert_eq!(flags.len(), 2);
    assert_eq!(flags[0]["orderId"], first.id);
    assert_eq!(flags[0]["step"], "wallet_credit");
    assert_eq!(flags[0]["resolved"], false);

    let path = format!("/admin/reconciliation/{}/resolve", flag.id);
    let (status, _) = server.post(&path, &admin_token(), json!({ "note": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = server.post(&path, &admin_token(), json!({ "note": "Credited by hand" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["resolved"], true);
    assert!(body["data"]["resolutionNote"].as_str().unwrap().starts_with("Credited by hand"));

    // Resolved flags drop off the open list, but remain visible per order
    let (_, body) = server.get("/admin/reconciliation", &admin_token()).await;
    let flags = body["data"].as_array().unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0]["step"], "product_status");
    let (_, body) = server.get(&format!("/admin/reconciliation?orderId={}", first.id), &admin_token()).await;
    let flags = body["data"].as_array().unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0]["resolved"], true);
}

#[actix_web::test]
async fn admin_overrides_follow_the_transition_table() {
    let server = TestServer::new().await;
    let order = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;
    let path = format!("/admin/orders/{}/status", order.id);

    let (status, body) = server.post(&path, &admin_token(), json!({ "status": "completed" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let cancel = json!({ "status": "cancelled", "note": "Fraud check" });
    let (status, body) = server.post(&path, &admin_token(), cancel).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "cancelled");

    // Terminal orders stay terminal
    let (status, body) = server.post(&path, &admin_token(), json!({ "status": "disputed", "note": "Chargeback" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (_, body) = server.get(&format!("/orders/{}/history", order.id), &admin_token()).await;
    let last = body["data"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["note"], "Fraud check");
}

#[actix_web::test]
async fn admins_cannot_confirm_payments_or_shipments_by_hand() {
    let server = TestServer::new().await;
    let order = server.place_order("lamp", GatewayKind::Stripe, PaymentMethod::Standard).await;
    let path = format!("/admin/orders/{}/status", order.id);
    for status in ["processing", "paid", "funds_held"] {
        let (status_code, body) = server.post(&path, &admin_token(), json!({ "status": status })).await;
        assert_eq!(status_code, StatusCode::BAD_REQUEST, "{status}: {body}");
        assert!(body["message"].as_str().unwrap().contains("confirmed gateway payment"), "{body}");
    }
    let untouched = server.db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, OrderStatus::Pending);
    assert!(!untouched.payment_completed);

    // The real confirmation still does all the work
    let payments = PaymentCoordinator::new(server.db.clone(), SimulatedGateway, EventProducers::default());
    let confirmation = GatewayConfirmation::new(GatewayKind::Stripe, "pi_after_admin");
    let result = payments.complete_payment(order.id, confirmation).await.unwrap();
    assert!(!result.already_processed);
    assert_eq!(result.order.status, OrderStatus::Paid);
    assert!(server.db.fetch_credit_for_order(order.id).await.unwrap().is_some());

    for status in ["shipped", "in_transit", "out_for_delivery", "delivered"] {
        let (status_code, body) = server.post(&path, &admin_token(), json!({ "status": status })).await;
        assert_eq!(status_code, StatusCode::BAD_REQUEST, "{status}: {body}");
    }
    assert!(server.db.fetch_active_tracking_for_order(order.id).await.unwrap().is_none());
    let (_, body) = server.get(&format!("/orders/{}", order.id), &admin_token()).await;
    assert_eq!(body["data"]["order"]["status"], "paid");
}

#[actix_web::test]
async fn admins_may_cancel_paid_orders() {
    let server = TestServer::new().await;
    let order = server.paid_order("lamp").await;
    let path = format!("/orders/{}/cancel", order.id);
    let (status, body) = server.post(&path, &admin_token(), json!({ "reason": "Seller is out of stock" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "cancelled");
}

#[actix_web::test]
async fn admin_deactivates_tracking() {
    let server = TestServer::new().await;
    let order = server.paid_order("lamp").await;
    let ship = json!({ "carrier": "fedex", "trackingNumber": "123456789012" });
    let (status, body) = server.post(&format!("/orders/{}/ship", order.id), &user_token(SELLER), ship).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let tracking_id = body["data"]["id"].as_i64().unwrap();
    let path = format!("/admin/tracking/{tracking_id}/deactivate");

    let (status, _) = server.post(&path, &user_token(SELLER), json!({ "reason": "Wrong parcel" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = server.post(&path, &admin_token(), json!({ "reason": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server.post(&path, &admin_token(), json!({ "reason": "Wrong parcel" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["isActive"], false);

    // Inactive shipments are not synced any more
    let (status, _) = server.post(&format!("/tracking/{tracking_id}/sync"), &user_token(BUYER), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
