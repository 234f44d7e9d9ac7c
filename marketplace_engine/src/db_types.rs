//! Data types that are persisted by lifecycle database backends.
//!
//! The `*Status` enums are stored as snake_case text, the same spelling used on the wire.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mkp_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid value for {kind}: {value}")]
pub struct ConversionError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ConversionError { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

//--------------------------------------     OrderStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, nothing has been charged yet.
    Pending,
    /// A payment has been initiated with the gateway and we are waiting for the outcome.
    Processing,
    /// Escrow payment captured. Funds are held by the platform until the buyer is satisfied.
    FundsHeld,
    /// Standard payment captured.
    Paid,
    PaymentFailed,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    Completed,
    Cancelled,
    Disputed,
    Refunded,
    Returned,
}

text_enum!(OrderStatus, "order status", {
    Pending => "pending",
    Processing => "processing",
    FundsHeld => "funds_held",
    Paid => "paid",
    PaymentFailed => "payment_failed",
    Shipped => "shipped",
    InTransit => "in_transit",
    OutForDelivery => "out_for_delivery",
    Delivered => "delivered",
    Completed => "completed",
    Cancelled => "cancelled",
    Disputed => "disputed",
    Refunded => "refunded",
    Returned => "returned",
});

//--------------------------------------     PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Standard,
    Escrow,
}

text_enum!(PaymentMethod, "payment method", {
    Standard => "standard",
    Escrow => "escrow",
});

//--------------------------------------      GatewayKind      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    Stripe,
    Paypal,
    Paytabs,
}

text_enum!(GatewayKind, "gateway", {
    Stripe => "stripe",
    Paypal => "paypal",
    Paytabs => "paytabs",
});

//--------------------------------------        FeePayer       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FeePayer {
    #[default]
    Buyer,
    Seller,
}

text_enum!(FeePayer, "fee payer", {
    Buyer => "buyer",
    Seller => "seller",
});

//--------------------------------------         Actor         ---------------------------------------------------------
/// Who caused a status change. Stored in the status history as `kind[:id]`, e.g. `buyer:alice` or `carrier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Actor {
    Buyer(String),
    Seller(String),
    Admin(String),
    Gateway(GatewayKind),
    Carrier,
    System,
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Buyer(id) => write!(f, "buyer:{id}"),
            Actor::Seller(id) => write!(f, "seller:{id}"),
            Actor::Admin(id) => write!(f, "admin:{id}"),
            Actor::Gateway(g) => write!(f, "gateway:{g}"),
            Actor::Carrier => write!(f, "carrier"),
            Actor::System => write!(f, "system"),
        }
    }
}

impl TryFrom<String> for Actor {
    type Error = ConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let err = || ConversionError { kind: "actor", value: value.clone() };
        match value.split_once(':') {
            Some(("buyer", id)) if !id.is_empty() => Ok(Actor::Buyer(id.to_string())),
            Some(("seller", id)) if !id.is_empty() => Ok(Actor::Seller(id.to_string())),
            Some(("admin", id)) if !id.is_empty() => Ok(Actor::Admin(id.to_string())),
            Some(("gateway", g)) => g.parse().map(Actor::Gateway).map_err(|_| err()),
            None if value == "carrier" => Ok(Actor::Carrier),
            None if value == "system" => Ok(Actor::System),
            _ => Err(err()),
        }
    }
}

impl From<Actor> for String {
    fn from(actor: Actor) -> Self {
        actor.to_string()
    }
}

//--------------------------------------    ShippingAddress    ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingAddress {
    #[sqlx(rename = "shipping_name")]
    pub full_name: String,
    #[sqlx(rename = "shipping_line1")]
    pub line1: String,
    #[sqlx(rename = "shipping_line2")]
    pub line2: Option<String>,
    #[sqlx(rename = "shipping_city")]
    pub city: String,
    #[sqlx(rename = "shipping_region")]
    pub region: Option<String>,
    #[sqlx(rename = "shipping_postal_code")]
    pub postal_code: String,
    #[sqlx(rename = "shipping_country")]
    pub country: String,
    #[sqlx(rename = "shipping_phone")]
    pub phone: Option<String>,
}

impl ShippingAddress {
    /// Returns the names of the required fields that are missing or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("fullName", &self.full_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postalCode", &self.postal_code),
            ("country", &self.country),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

//--------------------------------------      OrderAmounts     ---------------------------------------------------------
/// All monetary fields of an order, in minor units of `currency`. Always computed server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAmounts {
    pub product_price: Money,
    pub shipping_cost: Money,
    pub sales_tax: Money,
    pub platform_fee: Money,
    pub gateway_fee: Money,
    pub total_amount: Money,
    pub seller_payout: Money,
    pub fee_payer: FeePayer,
    pub currency: String,
}

impl OrderAmounts {
    /// What the buyer pays before any gateway fee: price, shipping and tax.
    pub fn buyer_subtotal(&self) -> Money {
        self.product_price + self.shipping_cost + self.sales_tax
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    /// Stable, globally unique external reference for the purchase.
    pub transaction_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub product_id: String,
    pub payment_method: PaymentMethod,
    pub gateway: GatewayKind,
    #[sqlx(flatten)]
    pub amounts: OrderAmounts,
    pub status: OrderStatus,
    pub gateway_transaction_id: Option<String>,
    /// Opaque, last-known gateway state, stored as JSON text.
    pub gateway_response: Option<String>,
    #[sqlx(flatten)]
    pub shipping_address: ShippingAddress,
    /// Set in the same write as the transition to `paid`/`funds_held`. Never cleared.
    pub payment_completed: bool,
    pub dispute_reason: Option<String>,
    pub dispute_raised_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Optimistic lock. Every status write bumps this by one.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
/// A fully priced order, ready to be stored. Produced by the order API, never built from client input directly.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub transaction_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub product_id: String,
    pub payment_method: PaymentMethod,
    pub gateway: GatewayKind,
    pub amounts: OrderAmounts,
    pub shipping_address: ShippingAddress,
}

//--------------------------------------   StatusHistoryEntry  ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub order_id: i64,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub actor: Actor,
    pub note: Option<String>,
}

//--------------------------------------        Product        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Active,
    Reserved,
    Sold,
    Inactive,
}

text_enum!(ProductStatus, "product status", {
    Active => "active",
    Reserved => "reserved",
    Sold => "sold",
    Inactive => "inactive",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub price: Money,
    pub shipping_cost: Money,
    pub currency: String,
    pub status: ProductStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub price: Money,
    #[serde(default)]
    pub shipping_cost: Money,
    pub currency: String,
    #[serde(default)]
    pub status: ProductStatus,
}

//--------------------------------------   FulfillmentRecord   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    AwaitingShipment,
    Shipped,
    Cancelled,
}

text_enum!(FulfillmentStatus, "fulfillment status", {
    AwaitingShipment => "awaiting_shipment",
    Shipped => "shipped",
    Cancelled => "cancelled",
});

/// The durable shipment work item that payment completion materialises for the seller.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentRecord {
    pub id: i64,
    pub order_id: i64,
    pub transaction_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub product_id: String,
    #[sqlx(flatten)]
    pub shipping_address: ShippingAddress,
    pub status: FulfillmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Tracking       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    #[default]
    Pending,
    InfoReceived,
    InTransit,
    OutForDelivery,
    AttemptFail,
    Delivered,
    Exception,
    Returned,
}

text_enum!(TrackingStatus, "tracking status", {
    Pending => "pending",
    InfoReceived => "info_received",
    InTransit => "in_transit",
    OutForDelivery => "out_for_delivery",
    AttemptFail => "attempt_fail",
    Delivered => "delivered",
    Exception => "exception",
    Returned => "returned",
});

impl TrackingStatus {
    /// The order status that a shipment reaching this status implies, if any.
    pub fn implied_order_status(&self) -> Option<OrderStatus> {
        match self {
            TrackingStatus::InTransit => Some(OrderStatus::InTransit),
            TrackingStatus::OutForDelivery => Some(OrderStatus::OutForDelivery),
            TrackingStatus::Delivered => Some(OrderStatus::Delivered),
            TrackingStatus::Returned => Some(OrderStatus::Returned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Manual,
    CarrierSync,
    Webhook,
}

text_enum!(EventSource, "event source", {
    Manual => "manual",
    CarrierSync => "carrier_sync",
    Webhook => "webhook",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryConfirmer {
    Buyer,
    Carrier,
    System,
}

text_enum!(DeliveryConfirmer, "delivery confirmer", {
    Buyer => "buyer",
    Carrier => "carrier",
    System => "system",
});

#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfirmation {
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub confirmed_by: Option<DeliveryConfirmer>,
    pub rating: Option<i64>,
    pub feedback: Option<String>,
    pub delivery_proof: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracking {
    pub id: i64,
    /// Lookup reference only. The order does not own its tracking record.
    pub order_id: i64,
    pub carrier: String,
    pub tracking_number: String,
    pub tracking_url: Option<String>,
    pub status: TrackingStatus,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub deactivation_reason: Option<String>,
    #[sqlx(flatten)]
    pub delivery_confirmation: DeliveryConfirmation,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTracking {
    pub order_id: i64,
    pub carrier: String,
    pub tracking_number: String,
    pub tracking_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub id: i64,
    pub tracking_id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: TrackingStatus,
    pub description: String,
    pub location: Option<String>,
    pub source: EventSource,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrackingEvent {
    pub timestamp: DateTime<Utc>,
    pub status: TrackingStatus,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    pub source: EventSource,
}

impl NewTrackingEvent {
    /// Events are considered duplicates when they share a timestamp and description.
    pub fn is_same_event(&self, other: &TrackingEvent) -> bool {
        self.timestamp == other.timestamp && self.description == other.description
    }
}

//--------------------------------------      WalletCredit     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCredit {
    pub id: i64,
    pub user_id: String,
    pub order_id: i64,
    pub amount: Money,
    pub currency: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------   Reconciliation      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStep {
    WalletCredit,
    ProductStatus,
    FulfillmentRecord,
    AmountMismatch,
    PaymentAfterTermination,
}

text_enum!(ReconciliationStep, "reconciliation step", {
    WalletCredit => "wallet_credit",
    ProductStatus => "product_status",
    FulfillmentRecord => "fulfillment_record",
    AmountMismatch => "amount_mismatch",
    PaymentAfterTermination => "payment_after_termination",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationFlag {
    pub id: i64,
    pub order_id: i64,
    pub step: ReconciliationStep,
    pub message: String,
    pub resolved: bool,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
