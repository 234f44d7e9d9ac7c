#![allow(dead_code)]

use log::*;
use marketplace_engine::{
    db_types::{GatewayKind, NewProduct, Order, PaymentMethod, ShippingAddress},
    events::EventProducers,
    integrations::{OfflineCarrier, SimulatedGateway},
    order_objects::CreateOrderRequest,
    pricing::FeeSchedule,
    test_utils::prepare_env::fresh_database,
    LifecycleDatabase,
    OrderApi,
    PaymentCoordinator,
    ProductCatalog,
    SqliteDatabase,
    TrackingApi,
};
use mkp_common::{BasisPoints, Money};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const SELLER: &str = "seller-sam";
pub const BUYER: &str = "buyer-bea";

/// Every engine API wired to one fresh database.
pub struct Marketplace {
    pub db: SqliteDatabase,
    pub orders: OrderApi<SqliteDatabase>,
    pub payments: PaymentCoordinator<SqliteDatabase, SimulatedGateway>,
    pub tracking: TrackingApi<SqliteDatabase, OfflineCarrier>,
}

impl std::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Marketplace({})", self.db.url())
    }
}

/// 0.72% sales tax, 5% platform fee and Stripe at 2.9% + 0.30, with the buyer paying the gateway fee.
pub fn test_fee_schedule() -> FeeSchedule {
    FeeSchedule { sales_tax_rate: BasisPoints::new(72), ..FeeSchedule::default() }
}

impl Marketplace {
    pub async fn new(producers: EventProducers) -> Self {
        let db = fresh_database(5).await;
        debug!("🚀️ Test marketplace using {}", db.url());
        let orders = OrderApi::new(db.clone(), test_fee_schedule(), producers.clone());
        let payments = PaymentCoordinator::new(db.clone(), SimulatedGateway, producers.clone());
        let tracking = TrackingApi::new(db.clone(), OfflineCarrier, producers);
        Self { db, orders, payments, tracking }
    }

    pub async fn add_product(&self, id: &str, seller: &str, price: Money, shipping: Money) {
        let product = NewProduct {
            id: id.to_string(),
            seller_id: seller.to_string(),
            title: format!("Product {id}"),
            price,
            shipping_cost: shipping,
            currency: "USD".to_string(),
            status: Default::default(),
        };
        self.db.upsert_product(product).await.expect("Error adding product");
    }

    pub async fn place_order(&self, buyer: &str, product_id: &str, method: PaymentMethod) -> Order {
        let request = CreateOrderRequest {
            product_id: product_id.to_string(),
            payment_method: method,
            gateway: GatewayKind::Stripe,
            shipping_address: address(),
        };
        self.orders.create_order(buyer, request).await.expect("Error creating order")
    }

    pub async fn tear_down(mut self) {
        let url = self.db.url().to_string();
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        if let Err(e) = Sqlite::drop_database(&url).await {
            warn!("🚀️ Could not remove test database {url}: {e}");
        }
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
        phone: Some("+966500000000".to_string()),
    }
}
