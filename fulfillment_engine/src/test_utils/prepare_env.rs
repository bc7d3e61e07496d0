use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::{
    db_types::{NewProduct, Product},
    SqliteDatabase,
};

/// Loads `.env.test`, initialises logging and creates a fresh, fully migrated database at `url`.
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    format!("sqlite://../data/test_store_{}.db", rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
}

pub async fn create_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("Created Sqlite database {url}");
}

/// Closes the pool and deletes the database file.
pub async fn tear_down_database(db: SqliteDatabase) {
    use crate::traits::FulfillmentDatabase;
    db.pool().close().await;
    if let Err(e) = Sqlite::drop_database(db.url()).await {
        warn!("Error dropping database {}: {e:?}", db.url());
    }
}

/// Stocks the catalogue used across the test suites.
pub async fn seed_products(db: &SqliteDatabase, products: &[(&str, &str, i64, i64)]) -> Vec<Product> {
    use crate::traits::FulfillmentDatabase;
    let mut result = Vec::with_capacity(products.len());
    for (id, name, price, stock) in products {
        let p = NewProduct::new(*id, *name, (*price).into(), *stock);
        result.push(db.upsert_product(p).await.expect("Error seeding product"));
    }
    result
}
