use std::{sync::Arc, time::Duration};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::*;
use mkp_common::Secret;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    StatusCode,
};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    db_types::{EventSource, NewTrackingEvent, TrackingStatus},
    errors::{GatewayError, LifecycleError},
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CarrierError {
    #[error("No carrier tracking provider is configured")]
    NotConfigured,
    #[error("The carrier provider does not know tracking number {0}")]
    NotFound(String),
    #[error("Could not reach the carrier provider. {0}")]
    Unavailable(String),
    #[error("The carrier provider returned an unexpected response. {0}")]
    InvalidResponse(String),
}

impl From<CarrierError> for LifecycleError {
    fn from(e: CarrierError) -> Self {
        match e {
            CarrierError::NotFound(n) => LifecycleError::TrackingNotFound(n),
            CarrierError::NotConfigured => LifecycleError::Gateway(GatewayError::NotConfigured(e.to_string())),
            CarrierError::Unavailable(m) => LifecycleError::Gateway(GatewayError::Unavailable(m)),
            CarrierError::InvalidResponse(m) => LifecycleError::Gateway(GatewayError::InvalidResponse(m)),
        }
    }
}

/// A single scan reported by the carrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierCheckpoint {
    pub timestamp: DateTime<Utc>,
    pub status: TrackingStatus,
    pub description: String,
    pub location: Option<String>,
}

impl CarrierCheckpoint {
    pub fn into_event(self, source: EventSource) -> NewTrackingEvent {
        NewTrackingEvent {
            timestamp: self.timestamp,
            status: self.status,
            description: self.description,
            location: self.location,
            source,
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait CarrierClient: Clone {
    /// Fetch every checkpoint the carrier has for the shipment, oldest first.
    async fn fetch_checkpoints(
        &self,
        carrier: &str,
        tracking_number: &str,
    ) -> Result<Vec<CarrierCheckpoint>, CarrierError>;
}

/// Maps an AfterShip checkpoint tag onto our tracking status vocabulary.
pub fn aftership_tag_to_status(tag: &str) -> TrackingStatus {
    match tag {
        "InfoReceived" => TrackingStatus::InfoReceived,
        "InTransit" => TrackingStatus::InTransit,
        "OutForDelivery" | "AvailableForPickup" => TrackingStatus::OutForDelivery,
        "AttemptFail" => TrackingStatus::AttemptFail,
        "Delivered" => TrackingStatus::Delivered,
        "Exception" | "Expired" => TrackingStatus::Exception,
        "Returned" | "ReturnToSender" => TrackingStatus::Returned,
        _ => TrackingStatus::Pending,
    }
}

/// Carrier timestamps arrive either as RFC 3339 or as a local time without an offset. The latter is taken as UTC.
pub fn parse_carrier_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok().map(|n| n.and_utc()))
}

//--------------------------------------     OfflineCarrier    ---------------------------------------------------------
/// Used when no tracking provider is configured. Syncing is a no-op and all updates come from sellers or webhooks.
#[derive(Debug, Clone, Default)]
pub struct OfflineCarrier;

impl CarrierClient for OfflineCarrier {
    async fn fetch_checkpoints(
        &self,
        carrier: &str,
        tracking_number: &str,
    ) -> Result<Vec<CarrierCheckpoint>, CarrierError> {
        debug!("🚚️ No carrier provider configured. Skipping sync of {carrier}/{tracking_number}");
        Ok(Vec::new())
    }
}

//--------------------------------------     AfterShipClient   ---------------------------------------------------------
#[derive(Clone)]
pub struct AfterShipClient {
    base_url: String,
    client: Arc<Client>,
}

#[derive(Deserialize)]
struct AfterShipEnvelope {
    data: AfterShipData,
}

#[derive(Deserialize)]
struct AfterShipData {
    tracking: AfterShipTracking,
}

#[derive(Deserialize)]
struct AfterShipTracking {
    #[serde(default)]
    checkpoints: Vec<AfterShipCheckpoint>,
}

#[derive(Deserialize)]
pub(crate) struct AfterShipCheckpoint {
    pub checkpoint_time: String,
    #[serde(default)]
    pub message: String,
    pub location: Option<String>,
    #[serde(default)]
    pub tag: String,
}

impl AfterShipCheckpoint {
    pub(crate) fn to_checkpoint(&self) -> Option<CarrierCheckpoint> {
        let timestamp = parse_carrier_timestamp(&self.checkpoint_time)?;
        Some(CarrierCheckpoint {
            timestamp,
            status: aftership_tag_to_status(&self.tag),
            description: self.message.clone(),
            location: self.location.clone().filter(|l| !l.trim().is_empty()),
        })
    }
}

impl AfterShipClient {
    pub fn new(base_url: &str, api_key: Secret<String>, timeout: Duration) -> Result<Self, CarrierError> {
        let mut headers = HeaderMap::with_capacity(2);
        let key = HeaderValue::from_str(api_key.reveal()).map_err(|e| CarrierError::InvalidResponse(e.to_string()))?;
        headers.insert("as-api-key", key);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CarrierError::Unavailable(e.to_string()))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }
}

impl CarrierClient for AfterShipClient {
    async fn fetch_checkpoints(
        &self,
        carrier: &str,
        tracking_number: &str,
    ) -> Result<Vec<CarrierCheckpoint>, CarrierError> {
        let url = format!("{}/trackings/{carrier}/{tracking_number}", self.base_url);
        debug!("🚚️ Fetching checkpoints from {url}");
        let response = self.client.get(url).send().await.map_err(|e| CarrierError::Unavailable(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(CarrierError::NotFound(tracking_number.to_string())),
            s if !s.is_success() => {
                let msg = response.text().await.unwrap_or_default();
                return Err(CarrierError::Unavailable(format!("{s}: {msg}")));
            },
            _ => {},
        }
        let envelope = response
            .json::<AfterShipEnvelope>()
            .await
            .map_err(|e| CarrierError::InvalidResponse(e.to_string()))?;
        let checkpoints = envelope.data.tracking.checkpoints;
        let total = checkpoints.len();
        let mut result = checkpoints.iter().filter_map(AfterShipCheckpoint::to_checkpoint).collect::<Vec<_>>();
        if result.len() < total {
            warn!("🚚️ {} checkpoints for {tracking_number} had unreadable timestamps and were skipped", total - result.len());
        }
        result.sort_by_key(|c| c.timestamp);
        Ok(result)
    }
}

//--------------------------------------   ConfiguredCarrier   ---------------------------------------------------------
#[derive(Clone)]
pub enum ConfiguredCarrier {
    Offline(OfflineCarrier),
    AfterShip(AfterShipClient),
}

impl CarrierClient for ConfiguredCarrier {
    async fn fetch_checkpoints(
        &self,
        carrier: &str,
        tracking_number: &str,
    ) -> Result<Vec<CarrierCheckpoint>, CarrierError> {
        match self {
            Self::Offline(c) => c.fetch_checkpoints(carrier, tracking_number).await,
            Self::AfterShip(c) => c.fetch_checkpoints(carrier, tracking_number).await,
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_carrier_timestamp("2024-06-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_carrier_timestamp("2024-06-01T13:00:00+03:00"), Some(expected));
        assert_eq!(parse_carrier_timestamp("2024-06-01T10:00:00"), Some(expected));
        assert_eq!(parse_carrier_timestamp("yesterday"), None);
    }

    #[test]
    fn tags() {
        assert_eq!(aftership_tag_to_status("InTransit"), TrackingStatus::InTransit);
        assert_eq!(aftership_tag_to_status("AvailableForPickup"), TrackingStatus::OutForDelivery);
        assert_eq!(aftership_tag_to_status("Delivered"), TrackingStatus::Delivered);
        assert_eq!(aftership_tag_to_status("Expired"), TrackingStatus::Exception);
        assert_eq!(aftership_tag_to_status("SomethingNew"), TrackingStatus::Pending);
    }

    #[test]
    fn aftership_checkpoint_conversion() {
        let json = r#"{"checkpoint_time": "2024-06-02T08:30:00+00:00", "message": "Departed facility",
            "location": "", "tag": "InTransit"}"#;
        let cp: AfterShipCheckpoint = serde_json::from_str(json).unwrap();
        let cp = cp.to_checkpoint().unwrap();
        assert_eq!(cp.status, TrackingStatus::InTransit);
        assert_eq!(cp.description, "Departed facility");
        assert_eq!(cp.location, None);
    }
}
