use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{TimeZone, Utc};
use fulfillment_common::Money;
use fulfillment_engine::{
    db_types::{Order, OrderItem, OrderNumber, OrderStatusType, PaymentMethod, VerificationStatus},
    OrderQueryApi,
    OrderQueryError,
};
use serde_json::Value;

use super::{helpers::get_request, mocks::MockOrderManager};
use crate::routes::{OrderByNumberRoute, SearchOrdersRoute};

#[actix_web::test]
async fn fetch_order_by_number() {
    let _ = env_logger::try_init().ok();
    let mut db = MockOrderManager::new();
    db.expect_fetch_order_by_number()
        .withf(|n| n.as_str() == "MD00001")
        .returning(|_| Ok(Some(order(1, OrderStatusType::Pending))));
    db.expect_fetch_order_items().returning(|id| Ok(items(id)));
    // Order numbers typed by people are normalized
    let (status, body) = get_request("/order/md00001", configure(db)).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let order: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(order["order_number"], "MD00001");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["status_display"], "Pending");
    assert_eq!(order["total"], "39.98");
    assert_eq!(order["payment_method"], "Cash on Delivery");
    assert_eq!(order["items"][0]["product_id"], "P1");
    assert_eq!(order["items"][0]["quantity"], 2);
}

#[actix_web::test]
async fn fetch_missing_order() {
    let _ = env_logger::try_init().ok();
    let mut db = MockOrderManager::new();
    db.expect_fetch_order_by_number().returning(|_| Ok(None));
    let (status, body) = get_request("/order/MD00099", configure(db)).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["type"], "NotFound");
    assert_eq!(body["error"]["message"], "Order MD00099 not found");
    assert!(body["error"]["request_id"].is_string());
}

#[actix_web::test]
async fn search_by_status_and_phone() {
    let _ = env_logger::try_init().ok();
    let mut db = MockOrderManager::new();
    db.expect_search_orders()
        .withf(|q| {
            q.status == Some(vec![OrderStatusType::Pending, OrderStatusType::Confirmed]) &&
                q.phone.as_deref() == Some("012345678") &&
                q.limit == Some(5)
        })
        .times(1)
        .returning(|_| Ok(vec![order(2, OrderStatusType::Confirmed), order(1, OrderStatusType::Pending)]));
    db.expect_fetch_order_items().returning(|id| Ok(items(id)));
    let path = "/orders?status=pending,confirmed&phone=012-345-678&limit=5";
    let (status, body) = get_request(path, configure(db)).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let orders: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["order_number"], "MD00002");
    assert_eq!(orders[1]["order_number"], "MD00001");
}

#[actix_web::test]
async fn search_with_bad_filters() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/orders?status=lost", configure(MockOrderManager::new())).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"]["type"], "ValidationError");

    let (status, body) = get_request("/orders?colour=red", configure(MockOrderManager::new())).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"]["type"], "ValidationError");
}

#[actix_web::test]
async fn database_errors_are_not_leaked() {
    let _ = env_logger::try_init().ok();
    let mut db = MockOrderManager::new();
    db.expect_search_orders().returning(|_| Err(OrderQueryError::DatabaseError("disk I/O error at /var/db".into())));
    let (status, body) = get_request("/orders", configure(db)).await.expect("Request failed");
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"]["type"], "InternalError");
    assert_eq!(body["error"]["message"], "An unexpected error occurred");
    assert!(body["error"].get("detail").is_none());
    assert!(!body.to_string().contains("/var/db"));
}

fn configure(db: MockOrderManager) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        cfg.service(OrderByNumberRoute::<MockOrderManager>::new())
            .service(SearchOrdersRoute::<MockOrderManager>::new())
            .app_data(web::Data::new(OrderQueryApi::new(db)));
    }
}

fn order(id: i64, status: OrderStatusType) -> Order {
    let created_at = Utc.with_ymd_and_hms(2024, 6, 10, 8, 30, 0).unwrap() + chrono::Duration::minutes(id);
    Order {
        id,
        order_number: OrderNumber::from_sequence(id),
        customer_id: Some(1),
        customer_name: "Sok Dara".to_string(),
        customer_phone: "012345678".to_string(),
        customer_address: "St. 271".to_string(),
        customer_province: "Phnom Penh".to_string(),
        subtotal: Money::from(3998),
        discount: Money::default(),
        shipping: Money::default(),
        total: Money::from(3998),
        payment_method: PaymentMethod::CashOnDelivery,
        status,
        payment_received: status != OrderStatusType::Pending,
        payment_received_at: None,
        payment_received_by: None,
        cod_notes: None,
        is_verified: false,
        verification_status: VerificationStatus::Pending,
        is_suspicious: false,
        suspicious_reason: None,
        customer_received: false,
        customer_received_at: None,
        customer_received_by: None,
        customer_received_notes: None,
        created_at,
        updated_at: created_at,
    }
}

fn items(order_id: i64) -> Vec<OrderItem> {
    vec![OrderItem {
        id: order_id * 10,
        order_id,
        product_id: "P1".to_string(),
        product_name: "Lipstick".to_string(),
        product_price: Money::from(1999),
        quantity: 2,
        subtotal: Money::from(3998),
    }]
}
