#![allow(dead_code)]
use fulfillment_common::Money;
use fulfillment_engine::{
    db_types::{CartLine, NewOrder, PaymentMethod},
    test_utils::prepare_env::{prepare_test_env, random_db_path, seed_products, tear_down_database},
    SqliteDatabase,
};

pub const CATALOGUE: [(&str, &str, i64, i64); 4] = [
    ("P1", "Lipstick", 1999, 10),
    ("P2", "Mascara", 1250, 5),
    ("P3", "Serum", 45_000, 3),
    ("P4", "Toner", 800, 0),
];

/// A fresh, migrated and stocked database.
pub async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 10).await.expect("Error creating database");
    seed_products(&db, &CATALOGUE).await;
    db
}

pub async fn tear_down(db: SqliteDatabase) {
    tear_down_database(db).await;
}

pub fn line(product_id: &str, quantity: i64) -> CartLine {
    match CATALOGUE.iter().find(|p| p.0 == product_id) {
        Some((id, name, price, _)) => CartLine::new(*id, *name, Money::from(*price), quantity),
        None => CartLine::new(product_id, "Unknown", Money::from(100), quantity),
    }
}

pub fn cod_order(name: &str, phone: &str, lines: &[(&str, i64)]) -> NewOrder {
    order(name, phone, PaymentMethod::CashOnDelivery, lines)
}

pub fn order(name: &str, phone: &str, method: PaymentMethod, lines: &[(&str, i64)]) -> NewOrder {
    lines
        .iter()
        .fold(NewOrder::new(name, phone, "St 271, Toul Kork", "Phnom Penh", method), |o, (id, qty)| {
            o.with_item(line(id, *qty))
        })
}

pub async fn stock_of(db: &SqliteDatabase, product_id: &str) -> i64 {
    use fulfillment_engine::OrderManagement;
    db.fetch_product(product_id).await.expect("Error fetching product").map(|p| p.stock).unwrap_or_default()
}
