//! Marketplace Order Lifecycle Engine
//!
//! The engine is the single authority over a purchase's lifecycle: pricing, status transitions, payment completion,
//! shipment tracking and the webhooks that drive them. It knows nothing about HTTP.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`mod@traits`] and [`mod@sqlite`]). Backends implement the traits in [`traits`]; SQLite is provided.
//!    The persisted types live in [`db_types`].
//! 2. The status machine ([`status_machine`]) and server-side pricing ([`pricing`]).
//! 3. External capabilities ([`integrations`]): payment gateways, carriers and currency conversion.
//! 4. The public API ([`mod@lifecycle_api`]), which ties the above together.
//!
//! The engine also emits lifecycle events (order paid, shipped, delivered and annulled) that can be subscribed to via
//! [`events::EventHooks`].
pub mod db_types;
pub mod errors;
pub mod events;
pub mod helpers;
pub mod integrations;
mod lifecycle_api;
pub mod pricing;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod status_machine;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use errors::{GatewayError, LifecycleError};
pub use lifecycle_api::{
    order_api::OrderApi,
    order_objects,
    payment_coordinator::{PaymentCoordinator, DEFAULT_GATEWAY_TIMEOUT},
    payment_objects,
    reconciliation_api::ReconciliationApi,
    tracking_api::TrackingApi,
    tracking_objects,
    transition_api::TransitionApi,
    webhook_dispatcher::{
        signature_header,
        WebhookDispatcher,
        WebhookSecrets,
        CARRIER_SIGNATURE_HEADER,
        PAYPAL_SIGNATURE_HEADER,
        PAYTABS_SIGNATURE_HEADER,
        STRIPE_SIGNATURE_HEADER,
    },
    webhook_objects,
    webhook_payloads,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    CreditOutcome,
    LifecycleDatabase,
    OrderManagement,
    OrderQueryFilter,
    ProductCatalog,
    ReconciliationLog,
    StatusChange,
    TrackingManagement,
    WalletLedger,
};
