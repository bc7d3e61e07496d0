//! Order intake, payment and status routes, run against a throw-away SQLite database.
use actix_web::{http::StatusCode, test::TestRequest};
use fulfillment_engine::{
    test_utils::prepare_env::{prepare_test_env, random_db_path, seed_products, tear_down_database},
    SqliteDatabase,
};
use serde_json::{json, Value};

use super::helpers::{configure_with_db, get_request, post_request, send_request};
use crate::routes::QR_VALID_HEADER;

async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
    seed_products(&db, &[("P1", "Lipstick", 1999, 10), ("P2", "Mascara", 1250, 1)]).await;
    db
}

fn cart(payment_method: &str, items: Value, total: &str) -> Value {
    json!({
        "name": "Sok Dara",
        "phone": "012 345 678",
        "address": "St. 271, Toul Kork",
        "province": "Phnom Penh",
        "payment_method": payment_method,
        "subtotal": total,
        "discount": 0,
        "total": total,
        "items": items,
    })
}

async fn create_order(db: &SqliteDatabase, order: Value) -> String {
    let (status, body) = post_request("/order/create", order, configure_with_db(db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    body["order_number"].as_str().expect("order_number is missing").to_string()
}

async fn fetch_order(db: &SqliteDatabase, order_number: &str) -> Value {
    let (status, body) = get_request(&format!("/order/{order_number}"), configure_with_db(db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    serde_json::from_str(&body).unwrap()
}

async fn set_status(db: &SqliteDatabase, order_number: &str, status: &str) -> (StatusCode, Value) {
    let path = format!("/order/{order_number}/status");
    post_request(&path, json!({ "status": status, "actor": "Sophea" }), configure_with_db(db.clone())).await.unwrap()
}

#[actix_web::test]
async fn cod_order_from_checkout_to_doorstep() {
    let db = setup().await;
    let items = json!([{"id": "P1", "name": "Lipstick", "price": 19.99, "qty": 2}]);
    let n = create_order(&db, cart("Cash on Delivery", items, "39.98")).await;
    assert_eq!(n, "MD00001");
    let order = fetch_order(&db, &n).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["total"], "39.98");

    let confirm = json!({ "order_number": n, "driver_name": "Vuthy", "notes": "Paid in riel" });
    let (status, body) =
        post_request("/payment/cod/confirm", confirm.clone(), configure_with_db(db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["already_confirmed"], false);
    let order = fetch_order(&db, &n).await;
    assert_eq!(order["status"], "confirmed");
    assert_eq!(order["payment_received"], true);
    assert_eq!(order["payment_received_by"], "Vuthy");
    assert_eq!(order["customer_received"], false);

    // A second scan changes nothing
    let (status, body) = post_request("/payment/cod/confirm", confirm, configure_with_db(db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_confirmed"], true);

    for next in ["preparing", "ready_for_delivery", "out_for_delivery"] {
        let (status, body) = set_status(&db, &n, next).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["order"]["status"], next);
        assert_eq!(body["order"]["customer_received"], false);
    }
    let (status, body) = set_status(&db, &n, "delivered").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Order MD00001 moved from Out for Delivery to Delivered");
    assert_eq!(body["order"]["customer_received"], true);
    tear_down_database(db).await;
}

#[actix_web::test]
async fn status_changes_follow_the_state_machine() {
    let db = setup().await;
    let items = json!([{"id": "P1", "name": "Lipstick", "price": "19.99", "qty": 1}]);
    let n = create_order(&db, cart("COD", items, "19.99")).await;
    let (status, body) = set_status(&db, &n, "out_for_delivery").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "InvalidTransition");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("Allowed transitions: confirmed, preparing, cancelled"), "{message}");

    let (status, body) = set_status(&db, &n, "shipped").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "ValidationError");

    let (status, body) = set_status(&db, "MD00042", "confirmed").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "NotFound");
    tear_down_database(db).await;
}

#[actix_web::test]
async fn short_stock_rejects_the_whole_cart() {
    let db = setup().await;
    let items = json!([
        {"id": "P1", "name": "Lipstick", "price": 19.99, "qty": 1},
        {"id": "P2", "name": "Mascara", "price": 12.50, "qty": 3},
    ]);
    let order = cart("KHQR", items, "57.49");
    let (status, body) = post_request("/order/create", order, configure_with_db(db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["type"], "InsufficientStock");
    assert_eq!(body["error"]["items"], json!([{"id": "P2", "name": "Mascara", "available": 1, "requested": 3}]));

    let (status, body) = get_request("/orders", configure_with_db(db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
    tear_down_database(db).await;
}

#[actix_web::test]
async fn bad_order_requests() {
    let db = setup().await;
    // Totals that don't add up
    let items = json!([{"id": "P1", "name": "Lipstick", "price": 19.99, "qty": 2}]);
    let (status, body) =
        post_request("/order/create", cart("KHQR", items, "10.00"), configure_with_db(db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "ValidationError");

    // Amounts that don't fit
    for (price, qty) in [(json!("46116860184273879.04"), json!(4)), (json!(19.99), json!(i64::MAX / 1000))] {
        let items = json!([{"id": "P1", "name": "Lipstick", "price": price, "qty": qty}]);
        let (status, body) =
            post_request("/order/create", cart("KHQR", items, "0"), configure_with_db(db.clone())).await.unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["error"]["type"], "ValidationError");
    }

    // Missing fields
    let (status, body) =
        post_request("/order/create", json!({"name": "Dara"}), configure_with_db(db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "ValidationError");

    // Not JSON at all
    let req = TestRequest::post()
        .uri("/order/create")
        .insert_header(("content-type", "application/json"))
        .set_payload("{name: Dara");
    let res = send_request(req, configure_with_db(db.clone())).await.unwrap();
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&res.body).unwrap();
    assert_eq!(body["error"]["type"], "ValidationError");
    tear_down_database(db).await;
}

#[actix_web::test]
async fn received_without_a_body() {
    let db = setup().await;
    let items = json!([{"id": "P1", "name": "Lipstick", "price": 19.99, "qty": 1}]);
    let n = create_order(&db, cart("KHQR", items, "19.99")).await;
    let req = TestRequest::post().uri(&format!("/order/{n}/received"));
    let res = send_request(req, configure_with_db(db.clone())).await.unwrap();
    assert_eq!(res.status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&res.body).unwrap();
    assert_eq!(body["already_received"], false);

    let path = format!("/order/{n}/received");
    let (status, body) =
        post_request(&path, json!({"actor": "Sophea", "notes": "Left with the guard"}), configure_with_db(db.clone()))
            .await
            .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_received"], true);
    tear_down_database(db).await;
}

#[actix_web::test]
async fn cod_confirmation_is_only_for_cod_orders() {
    let db = setup().await;
    let items = json!([{"id": "P1", "name": "Lipstick", "price": 19.99, "qty": 1}]);
    let n = create_order(&db, cart("Wing Money", items, "19.99")).await;
    let (status, body) =
        post_request("/payment/cod/confirm", json!({"order_number": n}), configure_with_db(db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "ValidationError");
    tear_down_database(db).await;
}

#[actix_web::test]
async fn cod_orders_get_a_confirmation_qr_code() {
    let db = setup().await;
    let items = json!([{"id": "P1", "name": "Lipstick", "price": 19.99, "qty": 1}]);
    let n = create_order(&db, cart("Cash on Delivery", items, "19.99")).await;
    let req = TestRequest::get().uri(&format!("/payment/qr/{n}"));
    let res = send_request(req, configure_with_db(db.clone())).await.unwrap();
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.headers.get("content-type").unwrap(), "image/png");
    assert!(res.headers.get(QR_VALID_HEADER).is_none());
    assert!(res.body.starts_with(b"\x89PNG"));

    // Pre-paid orders have no QR code until one is issued
    let items = json!([{"id": "P1", "name": "Lipstick", "price": 19.99, "qty": 1}]);
    let n = create_order(&db, cart("KHQR", items, "19.99")).await;
    let req = TestRequest::get().uri(&format!("/payment/qr/{n}"));
    let res = send_request(req, configure_with_db(db.clone())).await.unwrap();
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    tear_down_database(db).await;
}
