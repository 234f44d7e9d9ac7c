//! # Marketplace server
//! The HTTP face of the marketplace order lifecycle engine. It is responsible for:
//! * Authenticating buyers, sellers and admins from a bearer JWT and handing their requests to the engine.
//! * Receiving payment gateway and carrier webhooks and passing the raw payloads to the engine's webhook dispatcher.
//! * Running the background worker that syncs shipments with the carrier and releases escrow for delivered orders.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! Unauthenticated:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/payments/webhook/{gateway}`: Stripe, PayPal and PayTabs payment notifications.
//! * `/tracking/webhook/{carrier}`: Carrier (or tracking aggregator) push updates.
//!
//! Everything else requires an `Authorization: Bearer <jwt>` header. The `/admin` routes also require the `admin`
//! role. See [routes](routes/index.html) for the full list.

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod tracking_worker;

#[cfg(test)]
mod endpoint_tests;
