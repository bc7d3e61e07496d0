//! The `orders_updates` websocket, driven straight through the route handler.
use std::time::Duration;

use actix_web::{
    body::to_bytes,
    dev::Payload,
    error::PayloadError,
    http::{header, StatusCode},
    test::TestRequest,
    web::{self, Bytes},
    FromRequest,
    HttpResponse,
};
use fulfillment_engine::{
    test_utils::prepare_env::{prepare_test_env, random_db_path, tear_down_database},
    SqliteDatabase,
    SubscriberCounter,
};

use crate::{
    broadcast::{reset_memberships, OrderBroadcaster, CAPACITY_CLOSE_CODE, ORDERS_GROUP},
    routes::orders_ws,
};

async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database")
}

/// Opens a session whose client never sends anything.
async fn connect(db: &SqliteDatabase, broadcaster: OrderBroadcaster) -> HttpResponse {
    let req = TestRequest::get()
        .uri("/ws/orders")
        .insert_header((header::UPGRADE, "websocket"))
        .insert_header((header::CONNECTION, "upgrade"))
        .insert_header((header::SEC_WEBSOCKET_VERSION, "13"))
        .insert_header((header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ=="))
        .to_http_request();
    let silent = futures::stream::pending::<Result<Bytes, PayloadError>>();
    let mut payload: Payload = Payload::Stream { payload: Box::pin(silent) };
    let body = web::Payload::from_request(&req, &mut payload).await.expect("Error extracting payload");
    orders_ws::<SqliteDatabase>(req, body, web::Data::new(db.clone()), web::Data::new(broadcaster))
        .await
        .expect("Websocket handshake failed")
}

async fn frames(res: HttpResponse) -> Bytes {
    tokio::time::timeout(Duration::from_secs(5), to_bytes(res.into_body()))
        .await
        .expect("The socket was never closed")
        .expect("Error reading frames")
}

/// The close frame sent to a client that is turned away
fn capacity_close_frame() -> Vec<u8> {
    let mut frame = vec![0x88, 10];
    frame.extend_from_slice(&CAPACITY_CLOSE_CODE.to_be_bytes());
    frame.extend_from_slice(b"capacity");
    frame
}

#[actix_web::test]
async fn a_full_group_turns_clients_away() {
    let db = setup().await;
    let broadcaster = OrderBroadcaster::new(2);
    for _ in 0..2 {
        assert!(db.try_join(ORDERS_GROUP, 2).await.unwrap().is_some());
    }
    let res = connect(&db, broadcaster.clone()).await;
    assert_eq!(res.status(), StatusCode::SWITCHING_PROTOCOLS);
    let frames = frames(res).await;
    assert_eq!(frames.as_ref(), capacity_close_frame().as_slice());
    // Rejected clients do not take a slot
    assert_eq!(db.try_join(ORDERS_GROUP, 2).await.unwrap(), None);
    tear_down_database(db).await;
}

#[actix_web::test]
async fn reset_readmits_clients() {
    let db = setup().await;
    let broadcaster = OrderBroadcaster::new(1).with_heartbeat(Duration::from_millis(50), Duration::from_millis(150));
    assert_eq!(db.try_join(ORDERS_GROUP, 1).await.unwrap(), Some(1));
    reset_memberships(&db).await.unwrap();
    let res = connect(&db, broadcaster).await;
    let frames = frames(res).await;
    assert!(frames.starts_with(&[0x81]), "Expected a welcome message first");
    assert!(!frames.ends_with(&capacity_close_frame()));
    tear_down_database(db).await;
}

#[actix_web::test]
async fn silent_clients_are_disconnected() {
    let db = setup().await;
    let broadcaster = OrderBroadcaster::new(1).with_heartbeat(Duration::from_millis(50), Duration::from_millis(150));
    let res = connect(&db, broadcaster).await;
    assert_eq!(res.status(), StatusCode::SWITCHING_PROTOCOLS);
    let frames = frames(res).await;
    let welcome = br#"{"type":"connection_established"}"#;
    assert_eq!(&frames[2..2 + welcome.len()], welcome);
    let mut close = vec![0x88, 9];
    close.extend_from_slice(&1001u16.to_be_bytes());
    close.extend_from_slice(b"timeout");
    assert!(frames.ends_with(&close));
    // The membership is released once the session ends
    let mut joined = None;
    for _ in 0..50 {
        joined = db.try_join(ORDERS_GROUP, 1).await.unwrap();
        if joined.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(joined, Some(1));
    tear_down_database(db).await;
}
