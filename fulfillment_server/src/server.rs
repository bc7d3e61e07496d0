use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use fulfillment_engine::{events::EventProducers, OrderFlowApi, OrderQueryApi, PaymentApi, SqliteDatabase};
use log::*;

use crate::{
    bot::{create_bot_event_handlers, BotApi, BotWebhookHandler},
    broadcast::{create_broadcast_event_handlers, reset_memberships, OrderBroadcaster},
    config::ServerConfig,
    errors::{json_error_handler, path_error_handler, query_error_handler, set_diagnostic_errors, ServerError},
    gateway::GatewayClient,
    qr_cleanup_worker::start_qr_cleanup_worker,
    routes::{
        health,
        khqr_create,
        BotWebhookRoute,
        ConfirmCodPaymentRoute,
        CreateOrderRoute,
        IssueQrCodeRoute,
        KhqrCheckRoute,
        MarkOrderReceivedRoute,
        OrderByNumberRoute,
        OrdersWsRoute,
        PaymentQrRoute,
        SearchOrdersRoute,
        UpdateOrderStatusRoute,
    },
};

const DB_MAX_CONNECTIONS: u32 = 25;

/// The long-lived services that every HTTP worker shares.
#[derive(Clone)]
pub struct SharedServices {
    pub producers: EventProducers,
    pub broadcaster: OrderBroadcaster,
    pub gateway: GatewayClient,
    pub bot: Option<BotApi>,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, DB_MAX_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    reset_memberships(&db).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    set_diagnostic_errors(config.debug_errors);
    let services = start_services(&config).await?;
    let _cleanup = start_qr_cleanup_worker(db.clone(), config.qr_retention, config.qr_cleanup_interval);
    let srv = create_server_instance(config, db, services)?;
    srv.await.map_err(ServerError::from)
}

/// Creates the gateway and bot clients and starts the event handlers that feed the websocket group and the bot.
pub async fn start_services(config: &ServerConfig) -> Result<SharedServices, ServerError> {
    let gateway = GatewayClient::new(config.gateway.clone())?;
    let bot = if config.bot.is_enabled() {
        let api = BotApi::new(&config.bot).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Some(api)
    } else {
        None
    };
    let broadcaster = OrderBroadcaster::new(config.max_ws_connections);
    let handlers = create_broadcast_event_handlers(broadcaster.clone());
    let mut producers = handlers.producers();
    handlers.start_handlers().await;
    if let Some(api) = &bot {
        let handlers = create_bot_event_handlers(api.clone(), config.bot.chat_ids.clone());
        producers = producers.merge(handlers.producers());
        handlers.start_handlers().await;
    }
    info!("🚀️ Event handlers started. Bot notifications are {}.", if bot.is_some() { "on" } else { "off" });
    Ok(SharedServices { producers, broadcaster, gateway, bot })
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    services: SharedServices,
) -> Result<Server, ServerError> {
    let rules = config.anomaly_rules;
    let public_url = config.public_url();
    let srv = HttpServer::new(move || {
        let producers = services.producers.clone();
        let public_url = public_url.clone();
        let flow_api = OrderFlowApi::new(db.clone(), producers.clone()).with_anomaly_rules(rules);
        let payment_api = PaymentApi::new(db.clone(), producers.clone());
        let query_api = OrderQueryApi::new(db.clone());
        let bot_handler = BotWebhookHandler::new(
            OrderFlowApi::new(db.clone(), producers).with_anomaly_rules(rules),
            OrderQueryApi::new(db.clone()),
            services.bot.clone(),
            public_url.as_str(),
        );
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("ofp::access_log"))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .app_data(web::PathConfig::default().error_handler(path_error_handler))
            .app_data(web::Data::new(flow_api))
            .app_data(web::Data::new(payment_api))
            .app_data(web::Data::new(query_api))
            .app_data(web::Data::new(bot_handler))
            .app_data(web::Data::new(services.gateway.clone()))
            .app_data(web::Data::new(services.broadcaster.clone()))
            .app_data(web::Data::new(public_url))
            .app_data(web::Data::new(db.clone()))
            .service(health)
            .service(CreateOrderRoute::<SqliteDatabase>::new())
            .service(SearchOrdersRoute::<SqliteDatabase>::new())
            .service(UpdateOrderStatusRoute::<SqliteDatabase>::new())
            .service(MarkOrderReceivedRoute::<SqliteDatabase>::new())
            .service(OrderByNumberRoute::<SqliteDatabase>::new())
            .service(ConfirmCodPaymentRoute::<SqliteDatabase>::new())
            .service(IssueQrCodeRoute::<SqliteDatabase>::new())
            .service(PaymentQrRoute::<SqliteDatabase>::new())
            .service(khqr_create)
            .service(KhqrCheckRoute::<SqliteDatabase>::new())
            .service(OrdersWsRoute::<SqliteDatabase>::new())
            .service(BotWebhookRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
