use std::{sync::Arc, time::Duration};

use actix_web::{body::to_bytes, http::StatusCode, test, test::TestRequest, App};
use chrono::{Days, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use log::debug;
use marketplace_engine::{
    db_types::{GatewayKind, NewProduct, Order, PaymentMethod, ShippingAddress},
    events::EventProducers,
    integrations::{CarrierClient, PaymentGateway, SimulatedGateway},
    order_objects::CreateOrderRequest,
    pricing::FeeSchedule,
    test_utils::prepare_env::fresh_database,
    OrderApi,
    PaymentCoordinator,
    ProductCatalog,
    SqliteDatabase,
    WebhookSecrets,
};
use mkp_common::Money;
use serde_json::{json, Value};

use super::mocks::{TestCarrier, TestGateway};
use crate::{
    auth::{JwtClaims, Role},
    config::AuthConfig,
    server::{configure_routes, register_apis, ApiSettings},
};

// Signs the test tokens. DO NOT re-use this secret anywhere.
pub const TEST_SECRET: &str = "endpoint-test-secret-6e1c0a7b9f7d4d6f8a2e";
pub const SELLER: &str = "seller-sam";
pub const BUYER: &str = "buyer-bea";
pub const STRANGER: &str = "nosy-ned";
pub const ADMIN: &str = "admin-ada";

pub fn issue_token(user: &str, roles: Vec<Role>) -> String {
    let claims = JwtClaims { sub: user.to_string(), roles, exp: (Utc::now() + Days::new(1)).timestamp() };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_SECRET.as_bytes())).expect("Failed to sign token")
}

pub fn user_token(user: &str) -> String {
    issue_token(user, vec![Role::User])
}

pub fn admin_token() -> String {
    issue_token(ADMIN, vec![Role::User, Role::Admin])
}

pub fn with_token(req: TestRequest, token: &str) -> TestRequest {
    req.insert_header(("Authorization", format!("Bearer {token}")))
}

/// Runs requests against the full route table, backed by a fresh database and mock upstreams.
pub struct TestServer<G = TestGateway, C = TestCarrier> {
    pub db: SqliteDatabase,
    pub gateway: G,
    pub carrier: C,
    pub settings: ApiSettings,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_upstreams(TestGateway::default(), TestCarrier::default()).await
    }

    pub async fn with_upstreams(gateway: TestGateway, carrier: TestCarrier) -> Self {
        let _ = env_logger::try_init();
        let db = fresh_database(5).await;
        let settings = ApiSettings {
            fees: FeeSchedule::default(),
            webhooks: WebhookSecrets::default(),
            gateway_timeout: Duration::from_secs(5),
        };
        Self { db, gateway, carrier, settings }
    }
}

impl<G, C> TestServer<G, C>
where
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
{
    pub async fn send(&self, req: TestRequest) -> (StatusCode, Value) {
        let db = self.db.clone();
        let gateway = self.gateway.clone();
        let carrier = self.carrier.clone();
        let settings = self.settings.clone();
        let verifier = Arc::new(crate::auth::TokenVerifier::new(&AuthConfig::new(TEST_SECRET)));
        let app = App::new()
            .configure(move |cfg| register_apis(cfg, db, gateway, carrier, &settings, EventProducers::default()))
            .configure(move |cfg| configure_routes::<SqliteDatabase, G, C>(cfg, verifier));
        let service = test::init_service(app).await;
        // Errors raised by middleware come back as `Err` rather than as a response
        let res = match test::try_call_service(&service, req.to_request()).await {
            Ok(res) => res.map_into_boxed_body().into_parts().1,
            Err(e) => e.error_response(),
        };
        let status = res.status();
        let bytes = to_bytes(res.into_body()).await.unwrap_or_default();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        debug!("🚀️ Response {status}: {body}");
        (status, body)
    }

    pub async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send(with_token(TestRequest::get().uri(path), token)).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(with_token(TestRequest::post().uri(path), token).set_json(body)).await
    }

    pub fn orders(&self) -> OrderApi<SqliteDatabase> {
        OrderApi::new(self.db.clone(), self.settings.fees.clone(), EventProducers::default())
    }

    pub async fn add_product(&self, id: &str, price: i64) {
        let product = NewProduct {
            id: id.to_string(),
            seller_id: SELLER.to_string(),
            title: format!("Product {id}"),
            price: Money::from_major(price),
            shipping_cost: Money::from_major(5),
            currency: "USD".to_string(),
            status: Default::default(),
        };
        self.db.upsert_product(product).await.expect("Error adding product");
    }

    /// Adds a product and has the buyer order it.
    pub async fn place_order(&self, product_id: &str, gateway: GatewayKind, method: PaymentMethod) -> Order {
        self.add_product(product_id, 100).await;
        let request = CreateOrderRequest {
            product_id: product_id.to_string(),
            payment_method: method,
            gateway,
            shipping_address: address(),
        };
        self.orders().create_order(BUYER, request).await.expect("Error creating order")
    }

    /// An order whose payment has been confirmed through the simulated gateway, with its fulfillment record in place.
    pub async fn paid_order(&self, product_id: &str) -> Order {
        let order = self.place_order(product_id, GatewayKind::Stripe, PaymentMethod::Standard).await;
        let payments = PaymentCoordinator::new(self.db.clone(), SimulatedGateway, EventProducers::default());
        payments.initiate_payment(order.id, BUYER).await.expect("Error paying for order").order
    }
}

pub fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Bea Buyer".to_string(),
        line1: "12 King Fahd Road".to_string(),
        line2: None,
        city: "Riyadh".to_string(),
        region: None,
        postal_code: "12271".to_string(),
        country: "SA".to_string(),
        phone: None,
    }
}

pub fn address_json() -> Value {
    json!({
        "fullName": "Bea Buyer",
        "line1": "12 King Fahd Road",
        "city": "Riyadh",
        "postalCode": "12271",
        "country": "SA"
    })
}
