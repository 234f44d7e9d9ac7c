//! Capabilities the lifecycle engine consumes from the outside world: payment gateways, shipment carriers and currency
//! conversion. Each is a trait with a production implementation and a local one for development.
mod carrier;
mod fx;
mod gateway;

pub use carrier::{
    aftership_tag_to_status,
    parse_carrier_timestamp,
    AfterShipClient,
    CarrierCheckpoint,
    CarrierClient,
    CarrierError,
    ConfiguredCarrier,
    OfflineCarrier,
};
pub(crate) use carrier::AfterShipCheckpoint;
pub use fx::{ConvertedAmount, CurrencyConverter, FixedRateConverter, FxError};
pub use gateway::{
    ConfiguredGateway,
    GatewayPaymentStatus,
    GatewayProxyClient,
    PaymentGateway,
    PaymentRequest,
    PaymentResult,
    SimulatedGateway,
};
