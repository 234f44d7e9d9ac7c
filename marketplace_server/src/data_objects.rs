use std::fmt::Display;

use marketplace_engine::db_types::{FulfillmentStatus, OrderStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ServerError;

/// The envelope for every buyer, seller and admin response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string(), data: None }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string(), data: None }
    }

    pub fn with_data<T: Serialize>(mut self, data: T) -> Result<Self, ServerError> {
        let value = serde_json::to_value(data).map_err(|e| ServerError::CouldNotSerializeResponse(e.to_string()))?;
        self.data = Some(value);
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderStatusQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FulfillmentQuery {
    pub status: Option<FulfillmentStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationQuery {
    pub order_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelOrderParams {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeParams {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStatusParams {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateTrackingParams {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveFlagParams {
    pub note: String,
}
