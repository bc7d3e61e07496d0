//! Request handler definitions
//!
//! Each route and its handler is defined here. Anything more than a few lines of logic belongs in the engine or in a
//! dedicated module (see [`crate::bot`] and [`crate::broadcast`]), so keep this module thin.
//!
//! Every worker thread handles its requests one after the other, so a handler that blocks the thread stalls the worker.
//! Database calls, gateway calls and bot calls are all async for this reason:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. The worker serves other requests meanwhile
//!     }
//! ```
use actix_web::{get, http::header, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use fulfillment_engine::{
    db_types::NewOrder,
    order_objects::OrderQueryFilter,
    FulfillmentDatabase,
    OrderFlowApi,
    OrderManagement,
    OrderQueryApi,
    PaymentApi,
    SubscriberCounter,
};
use log::*;
use serde_json::json;

use crate::{
    bot::{BotUpdate, BotWebhookHandler, RawUpdate},
    broadcast::{start_session, OrderBroadcaster},
    config::PublicUrl,
    data_objects::{
        parse_order_number,
        CodConfirmRequest,
        CodConfirmResponse,
        CreateOrderRequest,
        CreateOrderResponse,
        KhqrCheckParams,
        KhqrCreateParams,
        OrderSearchParams,
        QrIssueRequest,
        QrIssueResponse,
        ReceivedRequest,
        ReceivedResponse,
        StatusUpdateRequest,
        StatusUpdateResponse,
    },
    errors::ServerError,
    gateway::{GatewayClient, KhqrCurrency},
};

/// Response header reporting whether a stored payment QR code can still be used
pub const QR_VALID_HEADER: &str = "X-QR-Valid";

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
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/order/create" impl FulfillmentDatabase);
/// Checkout submits orders here. The cart is validated, stock is reserved and the order is numbered in one step.
///
/// Pre-paid orders start out `confirmed`; cash-on-delivery orders start out `pending`.
pub async fn create_order<B: FulfillmentDatabase>(
    api: web::Data<OrderFlowApi<B>>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received new order request for {}", body.name);
    let order = NewOrder::try_from(body.into_inner())?;
    let order = api.create_order(order).await?;
    Ok(HttpResponse::Ok().json(CreateOrderResponse::new(order.order_number)))
}

route!(order_by_number => Get "/order/{order_number}" impl OrderManagement);
pub async fn order_by_number<B: OrderManagement>(
    path: web::Path<String>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_number = parse_order_number(&path.into_inner())?;
    trace!("💻️ Fetching order {order_number}");
    let order = api
        .order_snapshot(&order_number)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("Order {order_number} not found")))?;
    Ok(HttpResponse::Ok().json(order))
}

route!(search_orders => Get "/orders" impl OrderManagement);
/// Filtered order search, newest first. `status` takes a comma-separated list, e.g. `?status=pending,confirmed`.
pub async fn search_orders<B: OrderManagement>(
    params: web::Query<OrderSearchParams>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let filter = OrderQueryFilter::try_from(params.into_inner())?;
    trace!("💻️ Searching orders: {filter}");
    let orders = api.search_orders(filter).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(update_order_status => Post "/order/{order_number}/status" impl FulfillmentDatabase);
/// Staff status changes. The order state machine is enforced; a disallowed move is a `400 InvalidTransition`.
pub async fn update_order_status<B: FulfillmentDatabase>(
    path: web::Path<String>,
    body: web::Json<StatusUpdateRequest>,
    api: web::Data<OrderFlowApi<B>>,
    queries: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_number = parse_order_number(&path.into_inner())?;
    let status = body.status()?;
    let actor = body.actor();
    debug!("💻️ {actor} requested a status change for {order_number} to {status}");
    let change = api.update_status(&order_number, status, &actor).await?;
    let message = format!(
        "Order {order_number} moved from {} to {}",
        change.old_status.display_name(),
        change.new_status().display_name()
    );
    let order = queries
        .order_snapshot(&order_number)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("Order {order_number} not found")))?;
    Ok(HttpResponse::Ok().json(StatusUpdateResponse { success: true, message, order }))
}

route!(mark_order_received => Post "/order/{order_number}/received" impl FulfillmentDatabase);
/// Records that the customer has the goods. The body is optional.
pub async fn mark_order_received<B: FulfillmentDatabase>(
    path: web::Path<String>,
    body: Option<web::Json<ReceivedRequest>>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_number = parse_order_number(&path.into_inner())?;
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let receipt = api.mark_customer_received(&order_number, &body.actor(), body.notes()).await?;
    let message = if receipt.already_received {
        format!("Order {order_number} was already marked as received")
    } else {
        format!("Order {order_number} marked as received")
    };
    let already_received = receipt.already_received;
    Ok(HttpResponse::Ok().json(ReceivedResponse { success: true, message, already_received }))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(confirm_cod_payment => Post "/payment/cod/confirm" impl FulfillmentDatabase);
/// Delivery drivers confirm cash collection here, usually after scanning the order's confirmation QR code.
///
/// Confirming twice is harmless: the second call reports `already_confirmed` and changes nothing.
pub async fn confirm_cod_payment<B: FulfillmentDatabase>(
    body: web::Json<CodConfirmRequest>,
    api: web::Data<PaymentApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_number = parse_order_number(&body.order_number)?;
    let actor = body.actor();
    debug!("💻️ COD confirmation for {order_number} from {actor}");
    let confirmation = api.confirm_cod_payment(&order_number, &actor, body.notes()).await?;
    let already_confirmed = confirmation.already_confirmed;
    let message = if already_confirmed {
        format!("Payment for order {order_number} was already confirmed")
    } else {
        format!("Payment confirmed for order {order_number}")
    };
    Ok(HttpResponse::Ok().json(CodConfirmResponse { success: true, message, already_confirmed }))
}

route!(payment_qr => Get "/payment/qr/{order_number}" impl FulfillmentDatabase);
/// Serves the payment QR image of an order as a PNG.
///
/// Stored (pre-paid) codes carry their validity in the `X-QR-Valid` header. Cash-on-delivery orders without a stored
/// code get a QR code for their confirmation link, which does not expire.
pub async fn payment_qr<B: FulfillmentDatabase>(
    path: web::Path<String>,
    api: web::Data<PaymentApi<B>>,
    public_url: web::Data<PublicUrl>,
) -> Result<HttpResponse, ServerError> {
    let order_number = parse_order_number(&path.into_inner())?;
    let image = api.payment_qr_image(&order_number, public_url.as_str(), Utc::now()).await?;
    let mut response = HttpResponse::Ok();
    response.content_type("image/png").insert_header((header::CACHE_CONTROL, "no-store"));
    if let Some(valid) = image.valid {
        response.insert_header((QR_VALID_HEADER, valid.to_string()));
    }
    Ok(response.body(image.png))
}

route!(issue_qr_code => Post "/payment/qr/issue" impl FulfillmentDatabase);
/// Issues the payment QR code for a pre-paid order, or returns the one issued earlier.
///
/// A new reference URL must be reachable before it is encoded.
pub async fn issue_qr_code<B: FulfillmentDatabase>(
    body: web::Json<QrIssueRequest>,
    api: web::Data<PaymentApi<B>>,
    gateway: web::Data<GatewayClient>,
) -> Result<HttpResponse, ServerError> {
    let order_number = parse_order_number(&body.order_number)?;
    if api.fetch_qr_code(&order_number).await?.is_none() {
        gateway.verify_reference_url(&body.qr_url).await?;
    }
    let (qr, issued) = api.issue_qr_code(&order_number, &body.qr_url).await?;
    let message = if issued {
        format!("QR code issued for order {order_number}")
    } else {
        format!("Reusing the QR code issued for order {order_number}")
    };
    let response = QrIssueResponse { success: true, message, expires_at: qr.expires_at, valid: qr.is_valid() };
    Ok(HttpResponse::Ok().json(response))
}

/// Passes a KHQR creation request through to the payment gateway. Unknown currencies fall back to USD.
#[get("/payment/khqr/create")]
pub async fn khqr_create(
    params: web::Query<KhqrCreateParams>,
    gateway: web::Data<GatewayClient>,
) -> Result<HttpResponse, ServerError> {
    let amount = params.amount()?;
    let currency = KhqrCurrency::parse_or_default(params.currency.as_deref());
    let data = gateway.create_khqr(amount, currency).await?;
    Ok(HttpResponse::Ok().json(data))
}

route!(khqr_check => Get "/payment/khqr/check" impl FulfillmentDatabase);
/// Asks the gateway whether a KHQR payment has completed. A payment the gateway doesn't know about yet is pending.
///
/// When the payment is complete and `order_number` is given, the order's QR code is marked as used.
pub async fn khqr_check<B: FulfillmentDatabase>(
    params: web::Query<KhqrCheckParams>,
    gateway: web::Data<GatewayClient>,
    api: web::Data<PaymentApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = params.into_inner();
    let status = gateway.check_payment(&params.md5).await?;
    let order_number = params.order_number.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if let (true, Some(order_number)) = (status.paid, order_number) {
        let order_number = parse_order_number(order_number)?;
        match api.mark_qr_used(&order_number).await {
            Ok(_) => info!("💻️ KHQR payment for {order_number} completed"),
            Err(e) => warn!("💻️ KHQR payment for {order_number} completed, but its QR code was not updated. {e}"),
        }
    }
    Ok(HttpResponse::Ok().json(status))
}

//----------------------------------------------   Real-time  ----------------------------------------------------
route!(orders_ws => Get "/ws/orders" impl SubscriberCounter);
/// Upgrades to a websocket and joins the `orders_updates` group. Over capacity, the socket is closed with code 4003.
pub async fn orders_ws<C: SubscriberCounter + 'static>(
    req: HttpRequest,
    body: web::Payload,
    counter: web::Data<C>,
    broadcaster: web::Data<OrderBroadcaster>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, session, stream) = actix_ws::handle(&req, body)?;
    start_session(&broadcaster, counter.get_ref().clone(), session, stream).await;
    Ok(response)
}

//----------------------------------------------   Bot  ----------------------------------------------------
route!(bot_webhook => Post "/bot/webhook" impl FulfillmentDatabase);
/// Inbound updates from the messaging bot. Replies are sent after the update is acknowledged.
pub async fn bot_webhook<B: FulfillmentDatabase + 'static>(
    body: web::Json<RawUpdate>,
    handler: web::Data<BotWebhookHandler<B>>,
) -> Result<HttpResponse, ServerError> {
    let update = BotUpdate::from(body.into_inner());
    trace!("💻️ Received bot update: {update:?}");
    let reply = handler.handle(update).await;
    let handler = handler.into_inner();
    actix_web::rt::spawn(async move { handler.deliver(reply).await });
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}
