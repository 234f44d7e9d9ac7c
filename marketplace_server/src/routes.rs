//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into the engine. Keep this module neat and tidy 🙏
//!
//! Every handler is generic over the storage backend and, where it needs them, the payment gateway and the carrier
//! client. The concrete types are chosen in [`crate::server`]; the endpoint tests substitute mocks.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Gateway and carrier calls are async and bounded by a timeout in the
//! engine, so a slow upstream never stalls a worker.
//!
//! | Method | Path                                          | Who                          |
//! |--------|-----------------------------------------------|------------------------------|
//! | GET    | `/health`                                     | anyone                       |
//! | POST   | `/payments/webhook/{gateway}`                 | gateway (signed)             |
//! | POST   | `/tracking/webhook/{carrier}`                 | carrier (signed)             |
//! | POST   | `/orders`                                     | buyer                        |
//! | GET    | `/orders`                                     | buyer or seller (own orders) |
//! | GET    | `/orders/{order_id}`                          | participant or admin         |
//! | GET    | `/orders/{order_id}/history`                  | participant or admin         |
//! | POST   | `/orders/{order_id}/pay`                      | buyer                        |
//! | POST   | `/orders/{order_id}/cancel`                   | buyer (before payment), admin|
//! | POST   | `/orders/{order_id}/dispute`                  | buyer                        |
//! | POST   | `/orders/{order_id}/ship`                     | seller                       |
//! | GET    | `/orders/{order_id}/tracking`                 | participant or admin         |
//! | GET    | `/fulfillments`                               | seller                       |
//! | GET    | `/payments/{order_id}/status`                 | participant or admin         |
//! | GET    | `/tracking/{tracking_id}`                     | participant or admin         |
//! | POST   | `/tracking/{tracking_id}/events`              | seller                       |
//! | POST   | `/tracking/{tracking_id}/sync`                | participant or admin         |
//! | POST   | `/tracking/{tracking_id}/confirm-delivery`    | buyer                        |
//! | GET    | `/admin/reconciliation`                       | admin                        |
//! | POST   | `/admin/reconciliation/{flag_id}/resolve`     | admin                        |
//! | POST   | `/admin/orders/{order_id}/status`             | admin                        |
//! | POST   | `/admin/tracking/{tracking_id}/deactivate`    | admin                        |
use std::str::FromStr;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use bytes::Bytes;
use log::*;
use marketplace_engine::{
    db_types::{Actor, GatewayKind},
    integrations::{CarrierClient, GatewayPaymentStatus, PaymentGateway},
    order_objects::CreateOrderRequest,
    tracking_objects::{ConfirmDeliveryRequest, ManualTrackingUpdate, ShipOrderRequest},
    signature_header,
    LifecycleDatabase,
    OrderApi,
    PaymentCoordinator,
    ReconciliationApi,
    ReconciliationLog,
    TrackingApi,
    WebhookDispatcher,
    CARRIER_SIGNATURE_HEADER,
};

use crate::{
    auth::{JwtClaims, Role},
    data_objects::{
        AdminStatusParams,
        CancelOrderParams,
        DeactivateTrackingParams,
        DisputeParams,
        FulfillmentQuery,
        JsonResponse,
        OrderStatusQuery,
        ReconciliationQuery,
        ResolveFlagParams,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

fn header_value<'r>(req: &'r HttpRequest, name: &str) -> Option<&'r str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(payment_webhook => Post "/payments/webhook/{gateway}" impl LifecycleDatabase, PaymentGateway, CarrierClient);
/// Payment notifications from Stripe, PayPal and PayTabs.
///
/// The raw body is handed to the dispatcher untouched, since the signature covers the exact bytes that were sent.
/// A 2xx response means the event was applied, or was a harmless repeat. Anything else asks the gateway to retry.
pub async fn payment_webhook<B, G, C>(
    req: HttpRequest,
    path: web::Path<String>,
    body: Bytes,
    dispatcher: web::Data<WebhookDispatcher<B, G, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: LifecycleDatabase,
    G: PaymentGateway,
    C: CarrierClient,
{
    let gateway = GatewayKind::from_str(&path).map_err(|e| ServerError::NoRecordFound(e.to_string()))?;
    debug!("💻️ Received {gateway} webhook ({} bytes)", body.len());
    let signature = header_value(&req, signature_header(gateway));
    let outcome = dispatcher.handle_gateway_webhook(gateway, signature, &body).await.map_err(|e| {
        info!("💻️ {gateway} webhook was not processed. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(carrier_webhook => Post "/tracking/webhook/{carrier}" impl LifecycleDatabase, PaymentGateway, CarrierClient);
pub async fn carrier_webhook<B, G, C>(
    req: HttpRequest,
    path: web::Path<String>,
    body: Bytes,
    dispatcher: web::Data<WebhookDispatcher<B, G, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: LifecycleDatabase,
    G: PaymentGateway,
    C: CarrierClient,
{
    let carrier = path.into_inner();
    debug!("💻️ Received {carrier} tracking webhook ({} bytes)", body.len());
    let signature = header_value(&req, CARRIER_SIGNATURE_HEADER);
    let outcome = dispatcher.handle_carrier_webhook(&carrier, signature, &body).await.map_err(|e| {
        info!("💻️ {carrier} webhook was not processed. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(outcome))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/orders" impl LifecycleDatabase);
/// A buyer places an order for a product. The price, fees and payout are computed by the server.
pub async fn create_order<B: LifecycleDatabase>(
    claims: JwtClaims,
    body: web::Json<CreateOrderRequest>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST create_order for product {} by {}", body.product_id, claims.sub);
    let order = api.create_order(&claims.sub, body.into_inner()).await?;
    let response = JsonResponse::success(format!("Order {} created", order.id)).with_data(&order)?;
    Ok(HttpResponse::Created().json(response))
}

route!(my_orders => Get "/orders" impl LifecycleDatabase);
/// The caller's orders, as buyer or seller. Filter with `?status=`.
pub async fn my_orders<B: LifecycleDatabase>(
    claims: JwtClaims,
    query: web::Query<OrderStatusQuery>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET my_orders for {}", claims.sub);
    let orders = api.orders_for_user(&claims.sub, query.status).await?;
    let response = JsonResponse::success(format!("{} orders", orders.len())).with_data(&orders)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(order_by_id => Get "/orders/{order_id}" impl LifecycleDatabase);
/// The order with its status history and latest tracking record. Only the buyer, the seller and admins may see it.
pub async fn order_by_id<B: LifecycleDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order_by_id({order_id}) for {}", claims.sub);
    let details = api.order_details(order_id, &claims.sub, claims.is_admin()).await?;
    let response = JsonResponse::success(format!("Order {order_id} is {}", details.order.status)).with_data(&details)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(order_history => Get "/orders/{order_id}/history" impl LifecycleDatabase);
pub async fn order_history<B: LifecycleDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order_history({order_id}) for {}", claims.sub);
    let history = api.status_history(order_id, &claims.sub, claims.is_admin()).await?;
    let response = JsonResponse::success(format!("{} status changes", history.len())).with_data(&history)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(cancel_order => Post "/orders/{order_id}/cancel" impl LifecycleDatabase);
/// Buyers may cancel until the payment is confirmed. Admins may cancel any order the transition table allows.
pub async fn cancel_order<B: LifecycleDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: Option<web::Json<CancelOrderParams>>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let reason = body.and_then(|b| b.into_inner().reason);
    let actor = if claims.is_admin() { Actor::Admin(claims.sub.clone()) } else { Actor::Buyer(claims.sub.clone()) };
    info!("💻️ Cancel request for order {order_id} from {actor}");
    let order = api.cancel_order(order_id, actor, reason).await?;
    let response = JsonResponse::success(format!("Order {order_id} is {}", order.status)).with_data(&order)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(raise_dispute => Post "/orders/{order_id}/dispute" impl LifecycleDatabase);
pub async fn raise_dispute<B: LifecycleDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<DisputeParams>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    info!("💻️ Dispute raised on order {order_id} by {}", claims.sub);
    let order = api.raise_dispute(order_id, &claims.sub, &body.reason).await?;
    let response = JsonResponse::success(format!("Order {order_id} is {}", order.status)).with_data(&order)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(my_fulfillments => Get "/fulfillments" impl LifecycleDatabase);
/// The seller's shipment queue. Defaults to every fulfillment; use `?status=awaiting_shipment` for the open ones.
pub async fn my_fulfillments<B: LifecycleDatabase>(
    claims: JwtClaims,
    query: web::Query<FulfillmentQuery>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET my_fulfillments for {}", claims.sub);
    let fulfillments = api.fulfillments_for_seller(&claims.sub, query.status).await?;
    let response = JsonResponse::success(format!("{} fulfillments", fulfillments.len())).with_data(&fulfillments)?;
    Ok(HttpResponse::Ok().json(response))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(pay_order => Post "/orders/{order_id}/pay" impl LifecycleDatabase, PaymentGateway);
/// The buyer starts the payment. If the gateway needs the buyer to authorise it, the response carries a
/// `redirectUrl`; otherwise the outcome is already reflected in the order.
pub async fn pay_order<B, G>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<PaymentCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: LifecycleDatabase,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    info!("💻️ Payment initiated for order {order_id} by {}", claims.sub);
    let initiation = api.initiate_payment(order_id, &claims.sub).await?;
    let message = match &initiation.gateway_status {
        GatewayPaymentStatus::Succeeded { .. } => "Payment confirmed".to_string(),
        GatewayPaymentStatus::Pending => "Payment pending at the gateway".to_string(),
        GatewayPaymentStatus::Failed { reason } => format!("Payment failed. {reason}"),
        GatewayPaymentStatus::Cancelled => "Payment was cancelled".to_string(),
    };
    let response = JsonResponse::success(message).with_data(&initiation)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(payment_status => Get "/payments/{order_id}/status" impl LifecycleDatabase, PaymentGateway);
/// Polls the gateway for an unsettled payment. A confirmed payment is completed through the same once-only path as the
/// webhook, so polling and webhooks can race safely.
pub async fn payment_status<B, G>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<PaymentCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: LifecycleDatabase,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    debug!("💻️ GET payment_status({order_id}) for {}", claims.sub);
    let report = api.check_payment_status(order_id, &claims.sub, claims.is_admin()).await?;
    let message = match &report.completion {
        Some(c) if c.has_warnings() => format!("Order {order_id} is {}. Processed with warnings", report.order.status),
        _ => format!("Order {order_id} is {}", report.order.status),
    };
    let response = JsonResponse::success(message).with_data(&report)?;
    Ok(HttpResponse::Ok().json(response))
}

//----------------------------------------------   Tracking  ----------------------------------------------------
route!(ship_order => Post "/orders/{order_id}/ship" impl LifecycleDatabase, CarrierClient);
/// The seller records the carrier and tracking number. Returns the new tracking record.
pub async fn ship_order<B, C>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<ShipOrderRequest>,
    api: web::Data<TrackingApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: LifecycleDatabase,
    C: CarrierClient,
{
    let order_id = path.into_inner();
    info!("💻️ Ship request for order {order_id} via {} from {}", body.carrier, claims.sub);
    let tracking = api.mark_shipped(order_id, &claims.sub, body.into_inner()).await?;
    let response = JsonResponse::success(format!("Order {order_id} shipped")).with_data(&tracking)?;
    Ok(HttpResponse::Created().json(response))
}

route!(order_tracking => Get "/orders/{order_id}/tracking" impl LifecycleDatabase, CarrierClient);
pub async fn order_tracking<B, C>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<TrackingApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: LifecycleDatabase,
    C: CarrierClient,
{
    let order_id = path.into_inner();
    debug!("💻️ GET order_tracking({order_id}) for {}", claims.sub);
    let details = api.tracking_for_order(order_id, &claims.sub, claims.is_admin()).await?;
    let response = JsonResponse::success(format!("Shipment is {}", details.tracking.status)).with_data(&details)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(tracking_by_id => Get "/tracking/{tracking_id}" impl LifecycleDatabase, CarrierClient);
pub async fn tracking_by_id<B, C>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<TrackingApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: LifecycleDatabase,
    C: CarrierClient,
{
    let tracking_id = path.into_inner();
    debug!("💻️ GET tracking_by_id({tracking_id}) for {}", claims.sub);
    let details = api.tracking_details(tracking_id, &claims.sub, claims.is_admin()).await?;
    let response = JsonResponse::success(format!("Shipment is {}", details.tracking.status)).with_data(&details)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(add_tracking_update => Post "/tracking/{tracking_id}/events" impl LifecycleDatabase, CarrierClient);
/// A status update typed in by the seller, for carriers that cannot be polled.
pub async fn add_tracking_update<B, C>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<ManualTrackingUpdate>,
    api: web::Data<TrackingApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: LifecycleDatabase,
    C: CarrierClient,
{
    let tracking_id = path.into_inner();
    info!("💻️ Manual {} update on tracking {tracking_id} from {}", body.status, claims.sub);
    let tracking = api.record_manual_event(tracking_id, &claims.sub, body.into_inner()).await?;
    let response = JsonResponse::success(format!("Shipment is {}", tracking.status)).with_data(&tracking)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(sync_tracking => Post "/tracking/{tracking_id}/sync" impl LifecycleDatabase, CarrierClient);
pub async fn sync_tracking<B, C>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<TrackingApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: LifecycleDatabase,
    C: CarrierClient,
{
    let tracking_id = path.into_inner();
    debug!("💻️ Sync request for tracking {tracking_id} from {}", claims.sub);
    let result = api.sync_for_user(tracking_id, &claims.sub, claims.is_admin()).await?;
    let response = JsonResponse::success(format!("{} new events", result.appended)).with_data(&result)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(confirm_delivery => Post "/tracking/{tracking_id}/confirm-delivery" impl LifecycleDatabase, CarrierClient);
/// The buyer confirms receipt, optionally with a rating (1-5), feedback and a proof-of-delivery reference. Confirming
/// an already-confirmed delivery succeeds without changing anything.
pub async fn confirm_delivery<B, C>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: Option<web::Json<ConfirmDeliveryRequest>>,
    api: web::Data<TrackingApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: LifecycleDatabase,
    C: CarrierClient,
{
    let tracking_id = path.into_inner();
    let request = body.map(|b| b.into_inner()).unwrap_or_default();
    info!("💻️ Delivery confirmation for tracking {tracking_id} from {}", claims.sub);
    let tracking = api.confirm_delivery(tracking_id, &claims.sub, request).await?;
    let response = JsonResponse::success("Delivery confirmed").with_data(&tracking)?;
    Ok(HttpResponse::Ok().json(response))
}

//----------------------------------------------   Admin  ----------------------------------------------------
route!(reconciliation_flags => Get "/admin/reconciliation" impl ReconciliationLog where requires [Role::Admin]);
/// Open reconciliation flags, oldest first. With `?orderId=` every flag for that order, resolved or not.
pub async fn reconciliation_flags<B: ReconciliationLog>(
    query: web::Query<ReconciliationQuery>,
    api: web::Data<ReconciliationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET reconciliation_flags");
    let flags = match query.order_id {
        Some(order_id) => api.flags_for_order(order_id).await?,
        None => api.open_flags().await?,
    };
    let response = JsonResponse::success(format!("{} flags", flags.len())).with_data(&flags)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(resolve_flag => Post "/admin/reconciliation/{flag_id}/resolve" impl ReconciliationLog where requires [Role::Admin]);
pub async fn resolve_flag<B: ReconciliationLog>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<ResolveFlagParams>,
    api: web::Data<ReconciliationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let flag_id = path.into_inner();
    let flag = api.resolve_flag(flag_id, &claims.sub, &body.note).await?;
    let response = JsonResponse::success(format!("Flag {flag_id} resolved")).with_data(&flag)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(admin_order_status => Post "/admin/orders/{order_id}/status" impl LifecycleDatabase where requires [Role::Admin]);
/// Manual status override. The transition table still applies and terminal orders stay terminal. Payment and shipping
/// statuses are refused here.
pub async fn admin_order_status<B: LifecycleDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<AdminStatusParams>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let AdminStatusParams { status, note } = body.into_inner();
    info!("💻️ Admin {} is moving order {order_id} to {status}", claims.sub);
    let order = api.admin_transition(order_id, &claims.sub, status, note).await?;
    let response = JsonResponse::success(format!("Order {order_id} is {}", order.status)).with_data(&order)?;
    Ok(HttpResponse::Ok().json(response))
}

route!(deactivate_tracking => Post "/admin/tracking/{tracking_id}/deactivate" impl LifecycleDatabase, CarrierClient where requires [Role::Admin]);
pub async fn deactivate_tracking<B, C>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<DeactivateTrackingParams>,
    api: web::Data<TrackingApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: LifecycleDatabase,
    C: CarrierClient,
{
    let tracking_id = path.into_inner();
    info!("💻️ Admin {} is deactivating tracking {tracking_id}", claims.sub);
    let tracking = api.deactivate_tracking(tracking_id, &body.reason).await?;
    let response = JsonResponse::success(format!("Tracking {tracking_id} deactivated")).with_data(&tracking)?;
    Ok(HttpResponse::Ok().json(response))
}
