//! Bot updates, driven both through the webhook route and straight through the handler.
use actix_web::{http::StatusCode, test::TestRequest};
use fulfillment_engine::{
    db_types::{OrderNumber, OrderStatusType},
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path, seed_products, tear_down_database},
    OrderFlowApi,
    OrderQueryApi,
    SqliteDatabase,
};
use serde_json::{json, Value};

use super::helpers::{configure_with_db, post_request, send_request, PUBLIC_URL};
use crate::bot::{BotUpdate, BotWebhookHandler, RawUpdate};

const CHAT_ID: i64 = -100200300;

async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
    seed_products(&db, &[("P1", "Lipstick", 1999, 10)]).await;
    db
}

async fn place_order(db: &SqliteDatabase, payment_method: &str) -> String {
    let order = json!({
        "name": "Sok <Dara>",
        "phone": "012 345 678",
        "address": "St. 271, Toul Kork",
        "province": "Phnom Penh",
        "payment_method": payment_method,
        "subtotal": "19.99",
        "total": "19.99",
        "items": [{"id": "P1", "name": "Lipstick", "price": 19.99, "qty": 1}],
    });
    let (status, body) = post_request("/order/create", order, configure_with_db(db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    body["order_number"].as_str().unwrap().to_string()
}

fn handler(db: &SqliteDatabase) -> BotWebhookHandler<SqliteDatabase> {
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    BotWebhookHandler::new(flow, OrderQueryApi::new(db.clone()), None, PUBLIC_URL)
}

fn command(text: &str) -> Value {
    json!({ "update_id": 1, "message": { "chat": { "id": CHAT_ID }, "text": text } })
}

fn button(data: &str) -> Value {
    json!({
        "update_id": 2,
        "callback_query": { "id": "cb-1", "data": data, "message": { "chat": { "id": CHAT_ID } } }
    })
}

fn update(raw: Value) -> BotUpdate {
    BotUpdate::from(serde_json::from_value::<RawUpdate>(raw).unwrap())
}

#[actix_web::test]
async fn webhook_acknowledges_every_update() {
    let db = setup().await;
    for body in [command("/help"), command("/orders"), command("hello"), button("nonsense"), json!({"update_id": 3})] {
        let (status, reply) = post_request("/bot/webhook", body, configure_with_db(db.clone())).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply, json!({ "ok": true }));
    }
    tear_down_database(db).await;
}

#[actix_web::test]
async fn webhook_rejects_garbage() {
    let db = setup().await;
    let req = TestRequest::post()
        .uri("/bot/webhook")
        .insert_header(("content-type", "application/json"))
        .set_payload("not an update");
    let res = send_request(req, configure_with_db(db.clone())).await.unwrap();
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    tear_down_database(db).await;
}

#[actix_web::test]
async fn status_button_moves_the_order_along() {
    let db = setup().await;
    // Pre-paid orders start out confirmed
    let n = place_order(&db, "KHQR").await;
    let data = format!("status_{n}_preparing");
    let (status, _) = post_request("/bot/webhook", button(&data), configure_with_db(db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let number = OrderNumber::from_sequence(1);
    let order = OrderQueryApi::new(db.clone()).order_snapshot(&number).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Preparing);
    tear_down_database(db).await;
}

#[actix_web::test]
async fn status_button_replies() {
    let db = setup().await;
    let n = place_order(&db, "Cash on Delivery").await;
    let bot = handler(&db);
    let reply = bot.handle(update(button(&format!("status_{n}_confirmed")))).await;
    let (callback_id, toast) = reply.callback_answer.unwrap();
    assert_eq!(callback_id, "cb-1");
    assert_eq!(toast.as_deref(), Some("MD00001: Confirmed"));
    assert_eq!(reply.messages.len(), 2);
    assert_eq!(reply.messages[0].chat_id, CHAT_ID.to_string());
    assert_eq!(reply.messages[0].text, "✅ Order #MD00001 status updated to <b>Confirmed</b>");
    // Customer details are escaped before they go out as HTML
    assert!(reply.messages[1].text.contains("Sok &lt;Dara&gt;"), "{}", reply.messages[1].text);

    // Skipping ahead is refused, and the order stays put
    let reply = bot.handle(update(button(&format!("status_{n}_delivered")))).await;
    assert_eq!(reply.callback_answer.unwrap().1.as_deref(), Some("Not allowed"));
    assert!(reply.messages[0].text.starts_with("❌ Cannot update order #MD00001."));
    let order = OrderQueryApi::new(db.clone()).order_snapshot(&OrderNumber::from_sequence(1)).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Confirmed);

    let reply = bot.handle(update(button("status_MD00077_confirmed"))).await;
    assert_eq!(reply.messages[0].text, "❌ Order MD00077 not found.");
    tear_down_database(db).await;
}

#[actix_web::test]
async fn order_listings() {
    let db = setup().await;
    let bot = handler(&db);
    let reply = bot.handle(update(command("/preparing"))).await;
    assert_eq!(reply.messages.len(), 1);
    assert_eq!(reply.messages[0].text, "📦 No orders currently being prepared.");
    assert!(reply.callback_answer.is_none());

    place_order(&db, "Cash on Delivery").await;
    place_order(&db, "KHQR").await;
    let reply = bot.handle(update(command("/orders@shop_bot"))).await;
    // A header, then one message per order
    assert_eq!(reply.messages.len(), 3);
    assert!(reply.messages[1..].iter().all(|m| m.keyboard.is_some()));

    let reply = bot.handle(update(command("/order md00002"))).await;
    assert_eq!(reply.messages.len(), 1);
    assert!(reply.messages[0].text.contains("MD00002"));

    let reply = bot.handle(update(command("/dance"))).await;
    assert!(reply.messages.is_empty());
    tear_down_database(db).await;
}

#[actix_web::test]
async fn qr_links_are_only_for_cod_orders() {
    let db = setup().await;
    let cod = place_order(&db, "Cash on Delivery").await;
    let khqr = place_order(&db, "KHQR").await;
    let bot = handler(&db);
    let reply = bot.handle(update(button(&format!("qr_{cod}")))).await;
    assert_eq!(reply.messages.len(), 1);
    let text = &reply.messages[0].text;
    assert!(text.contains(&format!("{PUBLIC_URL}/payment/qr/{cod}")), "{text}");
    assert!(text.contains(&format!("{PUBLIC_URL}/cod/confirm/{cod}")), "{text}");

    let reply = bot.handle(update(button(&format!("qr_{khqr}")))).await;
    assert_eq!(reply.messages[0].text, "❌ This order is not Cash on Delivery.");
    tear_down_database(db).await;
}
