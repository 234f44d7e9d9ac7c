use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, web::ServiceConfig, App, HttpServer};
use log::*;
use marketplace_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    integrations::{CarrierClient, ConfiguredCarrier, ConfiguredGateway, PaymentGateway},
    pricing::FeeSchedule,
    LifecycleDatabase,
    OrderApi,
    PaymentCoordinator,
    ReconciliationApi,
    SqliteDatabase,
    TrackingApi,
    WebhookDispatcher,
    WebhookSecrets,
};

use crate::{
    auth::TokenVerifier,
    config::ServerConfig,
    errors::ServerError,
    middleware::JwtAuthMiddlewareFactory,
    routes::{
        health,
        AddTrackingUpdateRoute,
        AdminOrderStatusRoute,
        CancelOrderRoute,
        CarrierWebhookRoute,
        ConfirmDeliveryRoute,
        CreateOrderRoute,
        DeactivateTrackingRoute,
        MyFulfillmentsRoute,
        MyOrdersRoute,
        OrderByIdRoute,
        OrderHistoryRoute,
        OrderTrackingRoute,
        PayOrderRoute,
        PaymentStatusRoute,
        PaymentWebhookRoute,
        RaiseDisputeRoute,
        ReconciliationFlagsRoute,
        ResolveFlagRoute,
        ShipOrderRoute,
        SyncTrackingRoute,
        TrackingByIdRoute,
    },
    tracking_worker::start_tracking_worker,
};

/// The settings every worker needs to build its copy of the lifecycle APIs.
#[derive(Clone, Debug, Default)]
pub struct ApiSettings {
    pub fees: FeeSchedule,
    pub webhooks: WebhookSecrets,
    pub gateway_timeout: Duration,
}

impl ApiSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { fees: config.fees.clone(), webhooks: config.webhooks.clone(), gateway_timeout: config.gateway.timeout }
    }
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
        info!("🗃️ Database migrations are up to date");
    }
    let hooks = EventHooks::default();
    let handlers = EventHandlers::new(128, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let carrier = config.carrier.build()?;
    // The worker is not awaited; it runs for the lifetime of the server.
    let _worker = start_tracking_worker(
        db.clone(),
        carrier,
        producers.clone(),
        config.tracking_sync_interval,
        config.auto_complete_after,
    );
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let gateway = config.gateway.build()?;
    let carrier = config.carrier.build()?;
    let settings = ApiSettings::from_config(&config);
    let verifier = Arc::new(TokenVerifier::new(&config.auth));
    let srv = HttpServer::new(move || {
        let db = db.clone();
        let gateway = gateway.clone();
        let carrier = carrier.clone();
        let settings = settings.clone();
        let producers = producers.clone();
        let verifier = Arc::clone(&verifier);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mkp::access_log"))
            .configure(move |cfg| register_apis(cfg, db, gateway, carrier, &settings, producers))
            .configure(move |cfg| configure_routes::<SqliteDatabase, ConfiguredGateway, ConfiguredCarrier>(cfg, verifier))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Adds the lifecycle APIs to the app data, along with extractor settings that turn malformed requests into
/// `400 Bad Request` responses in the usual JSON envelope.
pub fn register_apis<B, G, C>(
    cfg: &mut ServiceConfig,
    db: B,
    gateway: G,
    carrier: C,
    settings: &ApiSettings,
    producers: EventProducers,
) where
    B: LifecycleDatabase + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
{
    let payments = || {
        PaymentCoordinator::new(db.clone(), gateway.clone(), producers.clone())
            .with_gateway_timeout(settings.gateway_timeout)
    };
    let tracking = || TrackingApi::new(db.clone(), carrier.clone(), producers.clone());
    let dispatcher = WebhookDispatcher::new(db.clone(), payments(), tracking(), settings.webhooks.clone());
    cfg.app_data(web::Data::new(OrderApi::new(db.clone(), settings.fees.clone(), producers.clone())))
        .app_data(web::Data::new(payments()))
        .app_data(web::Data::new(tracking()))
        .app_data(web::Data::new(ReconciliationApi::new(db.clone())))
        .app_data(web::Data::new(dispatcher))
        .app_data(
            web::JsonConfig::default()
                .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into()),
        )
        .app_data(
            web::QueryConfig::default()
                .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into()),
        );
}

/// Health and webhook routes are registered first and sit outside the authenticated scope. Gateways and carriers
/// authenticate with signatures instead of bearer tokens.
pub fn configure_routes<B, G, C>(cfg: &mut ServiceConfig, verifier: Arc<TokenVerifier>)
where
    B: LifecycleDatabase + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
{
    let auth_scope = web::scope("")
        .wrap(JwtAuthMiddlewareFactory::new(verifier))
        .service(CreateOrderRoute::<B>::new())
        .service(MyOrdersRoute::<B>::new())
        .service(OrderByIdRoute::<B>::new())
        .service(OrderHistoryRoute::<B>::new())
        .service(PayOrderRoute::<B, G>::new())
        .service(CancelOrderRoute::<B>::new())
        .service(RaiseDisputeRoute::<B>::new())
        .service(ShipOrderRoute::<B, C>::new())
        .service(OrderTrackingRoute::<B, C>::new())
        .service(MyFulfillmentsRoute::<B>::new())
        .service(PaymentStatusRoute::<B, G>::new())
        .service(TrackingByIdRoute::<B, C>::new())
        .service(AddTrackingUpdateRoute::<B, C>::new())
        .service(SyncTrackingRoute::<B, C>::new())
        .service(ConfirmDeliveryRoute::<B, C>::new())
        .service(ReconciliationFlagsRoute::<B>::new())
        .service(ResolveFlagRoute::<B>::new())
        .service(AdminOrderStatusRoute::<B>::new())
        .service(DeactivateTrackingRoute::<B, C>::new());
    cfg.service(health)
        .service(PaymentWebhookRoute::<B, G, C>::new())
        .service(CarrierWebhookRoute::<B, G, C>::new())
        .service(auth_scope);
}
