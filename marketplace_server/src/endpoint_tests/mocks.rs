use std::{sync::Arc, time::Duration};

use marketplace_engine::{
    db_types::GatewayKind,
    integrations::{CarrierCheckpoint, CarrierClient, CarrierError, PaymentGateway, PaymentRequest, PaymentResult},
    GatewayError,
};
use mockall::mock;

// The engine clones its gateway and carrier into every API it builds, so the mocks sit behind an Arc and every clone
// shares the same expectations.
mock! {
    pub GatewayCalls {
        pub fn process_payment(&self, request: PaymentRequest) -> Result<PaymentResult, GatewayError>;
        pub fn verify_payment(&self, gateway: GatewayKind, gateway_transaction_id: &str) -> Result<PaymentResult, GatewayError>;
    }
}

mock! {
    pub CarrierCalls {
        pub fn fetch_checkpoints(&self, carrier: &str, tracking_number: &str) -> Result<Vec<CarrierCheckpoint>, CarrierError>;
    }
}

#[derive(Clone)]
pub struct TestGateway {
    calls: Arc<MockGatewayCalls>,
    delay: Option<Duration>,
}

impl TestGateway {
    pub fn new(calls: MockGatewayCalls) -> Self {
        Self { calls: Arc::new(calls), delay: None }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for TestGateway {
    fn default() -> Self {
        Self::new(MockGatewayCalls::new())
    }
}

impl PaymentGateway for TestGateway {
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentResult, GatewayError> {
        self.wait().await;
        self.calls.process_payment(request)
    }

    async fn verify_payment(
        &self,
        gateway: GatewayKind,
        gateway_transaction_id: &str,
    ) -> Result<PaymentResult, GatewayError> {
        self.wait().await;
        self.calls.verify_payment(gateway, gateway_transaction_id)
    }
}

#[derive(Clone)]
pub struct TestCarrier {
    calls: Arc<MockCarrierCalls>,
}

impl TestCarrier {
    pub fn new(calls: MockCarrierCalls) -> Self {
        Self { calls: Arc::new(calls) }
    }
}

impl Default for TestCarrier {
    fn default() -> Self {
        Self::new(MockCarrierCalls::new())
    }
}

impl CarrierClient for TestCarrier {
    async fn fetch_checkpoints(
        &self,
        carrier: &str,
        tracking_number: &str,
    ) -> Result<Vec<CarrierCheckpoint>, CarrierError> {
        self.calls.fetch_checkpoints(carrier, tracking_number)
    }
}
