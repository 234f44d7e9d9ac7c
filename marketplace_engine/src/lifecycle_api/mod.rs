//! # Order lifecycle public API
//!
//! The API is modular, so that clients can pick the parts they need:
//!
//! * [`order_api`] creates and queries orders, and handles cancellation, disputes and admin overrides.
//! * [`transition_api`] is the single gate for status changes. The other APIs all go through it.
//! * [`payment_coordinator`] confirms payments exactly once and runs the downstream effects.
//! * [`tracking_api`] manages shipments, carrier updates and delivery confirmation.
//! * [`webhook_dispatcher`] verifies and routes gateway and carrier webhooks.
//! * [`reconciliation_api`] lists and resolves the follow-ups that payment completion flagged.
//!
//! # API usage
//!
//! Every API is created from a database backend that implements the backend traits it needs, plus whatever external
//! capabilities it uses:
//!
//! ```rust,ignore
//! use marketplace_engine::{events::EventProducers, OrderApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/marketplace.db", 5).await?;
//! let api = OrderApi::new(db, FeeSchedule::default(), EventProducers::default());
//! let order = api.order_for_user(42, "alice", false).await?;
//! ```

pub mod order_api;
pub mod order_objects;
pub mod payment_coordinator;
pub mod payment_objects;
pub mod reconciliation_api;
pub mod tracking_api;
pub mod tracking_objects;
pub mod transition_api;
pub mod webhook_dispatcher;
pub mod webhook_objects;
pub mod webhook_payloads;
