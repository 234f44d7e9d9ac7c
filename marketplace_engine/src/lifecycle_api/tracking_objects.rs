use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{NewTrackingEvent, Tracking, TrackingEvent, TrackingStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipOrderRequest {
    pub carrier: String,
    pub tracking_number: String,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDeliveryRequest {
    pub rating: Option<i64>,
    pub feedback: Option<String>,
    pub delivery_proof: Option<String>,
}

/// A status update typed in by the seller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualTrackingUpdate {
    pub status: TrackingStatus,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    /// Defaults to now.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingDetails {
    pub tracking: Tracking,
    pub events: Vec<TrackingEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingIngestResult {
    pub tracking: Tracking,
    /// Events that were new and got appended.
    pub appended: usize,
    /// Events that had already been recorded and were dropped.
    pub duplicates: usize,
}

/// A batch of checkpoints pushed by a carrier (or its aggregator) for one shipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierUpdate {
    pub carrier: String,
    pub tracking_number: String,
    pub events: Vec<NewTrackingEvent>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub synced: usize,
    pub failed: usize,
    pub new_events: usize,
}
