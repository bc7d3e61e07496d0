use actix_web::{
    body::MessageBody,
    http::{header::HeaderMap, StatusCode},
    test,
    test::TestRequest,
    web,
    web::{Bytes, ServiceConfig},
    App,
};
use fulfillment_engine::{events::EventProducers, OrderFlowApi, OrderQueryApi, PaymentApi, SqliteDatabase};
use log::debug;
use serde_json::Value;

use crate::{
    bot::BotWebhookHandler,
    config::PublicUrl,
    errors::{json_error_handler, path_error_handler, query_error_handler},
    routes::{
        BotWebhookRoute,
        ConfirmCodPaymentRoute,
        CreateOrderRoute,
        MarkOrderReceivedRoute,
        OrderByNumberRoute,
        PaymentQrRoute,
        SearchOrdersRoute,
        UpdateOrderStatusRoute,
    },
};

pub const PUBLIC_URL: &str = "https://shop.example";

pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Makes a single request against a fresh app. The app reports extractor errors the way the server does.
pub async fn send_request<F>(req: TestRequest, configure: F) -> Result<RawResponse, String>
where F: FnOnce(&mut ServiceConfig)
{
    let app = App::new()
        .app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .app_data(web::PathConfig::default().error_handler(path_error_handler))
        .configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let (_, res) = test::try_call_service(&service, req.to_request()).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let headers = res.headers().clone();
    let body = res.into_body().try_into_bytes().map_err(|_| "Could not read the response body".to_string())?;
    Ok(RawResponse { status, headers, body })
}

pub async fn get_request<F>(path: &str, configure: F) -> Result<(StatusCode, String), String>
where F: FnOnce(&mut ServiceConfig)
{
    let res = send_request(TestRequest::get().uri(path), configure).await?;
    Ok((res.status, String::from_utf8_lossy(&res.body).into_owned()))
}

pub async fn post_request<F>(path: &str, body: Value, configure: F) -> Result<(StatusCode, Value), String>
where F: FnOnce(&mut ServiceConfig)
{
    let res = send_request(TestRequest::post().uri(path).set_json(body), configure).await?;
    let json = serde_json::from_slice(&res.body).map_err(|e| format!("Response is not JSON. {e}"))?;
    Ok((res.status, json))
}

/// Registers the order and payment routes against a real database, with no event hooks.
pub fn configure_with_db(db: SqliteDatabase) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        let producers = EventProducers::default();
        let bot_handler = BotWebhookHandler::new(
            OrderFlowApi::new(db.clone(), producers.clone()),
            OrderQueryApi::new(db.clone()),
            None,
            PUBLIC_URL,
        );
        cfg.app_data(web::Data::new(OrderFlowApi::new(db.clone(), producers.clone())))
            .app_data(web::Data::new(PaymentApi::new(db.clone(), producers)))
            .app_data(web::Data::new(OrderQueryApi::new(db)))
            .app_data(web::Data::new(bot_handler))
            .app_data(web::Data::new(PublicUrl::new(PUBLIC_URL)))
            .service(CreateOrderRoute::<SqliteDatabase>::new())
            .service(SearchOrdersRoute::<SqliteDatabase>::new())
            .service(UpdateOrderStatusRoute::<SqliteDatabase>::new())
            .service(MarkOrderReceivedRoute::<SqliteDatabase>::new())
            .service(OrderByNumberRoute::<SqliteDatabase>::new())
            .service(ConfirmCodPaymentRoute::<SqliteDatabase>::new())
            .service(PaymentQrRoute::<SqliteDatabase>::new())
            .service(BotWebhookRoute::<SqliteDatabase>::new());
    }
}
