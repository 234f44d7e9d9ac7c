//! # Backend contracts
//!
//! These traits define what a storage backend must provide for the lifecycle engine to run on it.
//!
//! * [`OrderManagement`] stores orders, their append-only status history and the fulfillment records created on
//!   payment completion. Status writes are optimistic: a write against a stale `version` fails with
//!   [`crate::LifecycleError::ConcurrentModification`].
//! * [`TrackingManagement`] stores shipment records and their append-only event logs.
//! * [`ProductCatalog`], [`WalletLedger`] and [`ReconciliationLog`] are the narrow views of the external
//!   collaborators that payment completion touches.
//!
//! [`LifecycleDatabase`] bundles them all, and is what the APIs are generic over.
mod collaborators;
mod data_objects;
mod order_management;
mod tracking_management;

pub use collaborators::{ProductCatalog, ReconciliationLog, WalletLedger};
pub use data_objects::{CreditOutcome, OrderQueryFilter, StatusChange};
pub use order_management::OrderManagement;
pub use tracking_management::TrackingManagement;

/// Everything the lifecycle APIs need from a backend.
pub trait LifecycleDatabase:
    Clone + OrderManagement + TrackingManagement + ProductCatalog + WalletLedger + ReconciliationLog
{
    /// The URL of the database
    fn url(&self) -> &str;
}
