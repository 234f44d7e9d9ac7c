use std::{sync::Arc, time::Duration};

use log::*;
use mkp_common::{Money, Secret};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    db_types::{GatewayKind, PaymentMethod},
    errors::GatewayError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub order_id: i64,
    pub transaction_id: String,
    pub gateway: GatewayKind,
    pub payment_method: PaymentMethod,
    pub amount: Money,
    pub currency: String,
    pub buyer_id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum GatewayPaymentStatus {
    /// Captured (or authorised and held, for escrow). The settled amount is reported when the gateway knows it.
    Succeeded { amount: Option<Money>, currency: Option<String> },
    Pending,
    Failed { reason: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub gateway_transaction_id: String,
    #[serde(flatten)]
    pub status: GatewayPaymentStatus,
    /// Where to send the buyer to authorise the payment, for redirect-based flows.
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub raw: Value,
}

/// A uniform view over the payment processors.
///
/// Calls may block for a long time. Callers are expected to bound them with a timeout and to treat a timeout as an
/// unknown outcome.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone {
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentResult, GatewayError>;

    async fn verify_payment(
        &self,
        gateway: GatewayKind,
        gateway_transaction_id: &str,
    ) -> Result<PaymentResult, GatewayError>;
}

//--------------------------------------   SimulatedGateway    ---------------------------------------------------------
/// Approves every payment immediately. Used for local development and demos, where no gateway account exists.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway;

impl PaymentGateway for SimulatedGateway {
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentResult, GatewayError> {
        let txid = format!("sim_{}_{}", request.gateway, uuid::Uuid::new_v4().simple());
        info!("💳️ Simulated {} payment {txid} approved for {} {}", request.gateway, request.amount, request.currency);
        Ok(PaymentResult {
            gateway_transaction_id: txid,
            status: GatewayPaymentStatus::Succeeded { amount: Some(request.amount), currency: Some(request.currency) },
            redirect_url: None,
            raw: Value::Null,
        })
    }

    async fn verify_payment(
        &self,
        _gateway: GatewayKind,
        gateway_transaction_id: &str,
    ) -> Result<PaymentResult, GatewayError> {
        Ok(PaymentResult {
            gateway_transaction_id: gateway_transaction_id.to_string(),
            status: GatewayPaymentStatus::Succeeded { amount: None, currency: None },
            redirect_url: None,
            raw: Value::Null,
        })
    }
}

//--------------------------------------  GatewayProxyClient   ---------------------------------------------------------
/// Talks to a payment sidecar that owns the Stripe/PayPal/PayTabs SDK integrations and exposes them over a small
/// uniform REST API:
///
/// * `POST {base}/payments/{gateway}` with a [`PaymentRequest`] body
/// * `GET  {base}/payments/{gateway}/{gateway_transaction_id}`
///
/// Both return a [`PaymentResult`].
#[derive(Clone)]
pub struct GatewayProxyClient {
    base_url: String,
    client: Arc<Client>,
}

impl GatewayProxyClient {
    pub fn new(base_url: &str, api_key: Option<Secret<String>>, timeout: Duration) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::with_capacity(2);
        if let Some(key) = api_key {
            let val = HeaderValue::from_str(&format!("Bearer {}", key.reveal()))
                .map_err(|e| GatewayError::NotConfigured(e.to_string()))?;
            headers.insert("Authorization", val);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::NotConfigured(e.to_string()))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn handle_response(response: reqwest::Response) -> Result<PaymentResult, GatewayError> {
        let status = response.status();
        if status.is_success() {
            trace!("💳️ Gateway proxy responded {status}");
            return response.json::<PaymentResult>().await.map_err(|e| GatewayError::InvalidResponse(e.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => Err(GatewayError::Timeout),
            s if s.is_client_error() => Err(GatewayError::Rejected(format!("{s}: {message}"))),
            s => Err(GatewayError::Unavailable(format!("{s}: {message}"))),
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable(e.to_string())
    }
}

impl PaymentGateway for GatewayProxyClient {
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentResult, GatewayError> {
        let url = self.url(&format!("/payments/{}", request.gateway));
        debug!("💳️ Initiating {} payment for order {} via {url}", request.gateway, request.order_id);
        let response = self.client.post(url).json(&request).send().await.map_err(map_transport_error)?;
        Self::handle_response(response).await
    }

    async fn verify_payment(
        &self,
        gateway: GatewayKind,
        gateway_transaction_id: &str,
    ) -> Result<PaymentResult, GatewayError> {
        let url = self.url(&format!("/payments/{gateway}/{gateway_transaction_id}"));
        debug!("💳️ Verifying {gateway} payment {gateway_transaction_id}");
        let response = self.client.get(url).send().await.map_err(map_transport_error)?;
        Self::handle_response(response).await
    }
}

//--------------------------------------   ConfiguredGateway   ---------------------------------------------------------
/// The gateway selected at start-up by configuration.
#[derive(Clone)]
pub enum ConfiguredGateway {
    Simulated(SimulatedGateway),
    Proxy(GatewayProxyClient),
}

impl PaymentGateway for ConfiguredGateway {
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentResult, GatewayError> {
        match self {
            Self::Simulated(g) => g.process_payment(request).await,
            Self::Proxy(g) => g.process_payment(request).await,
        }
    }

    async fn verify_payment(
        &self,
        gateway: GatewayKind,
        gateway_transaction_id: &str,
    ) -> Result<PaymentResult, GatewayError> {
        match self {
            Self::Simulated(g) => g.verify_payment(gateway, gateway_transaction_id).await,
            Self::Proxy(g) => g.verify_payment(gateway, gateway_transaction_id).await,
        }
    }
}
