use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{NewProduct, Product};

/// Takes `quantity` units of the product out of stock, if the product is active and has enough stock.
///
/// The check and the decrement are a single statement, so no other writer can interleave. Returns the remaining stock,
/// or `None` if nothing was reserved.
pub async fn reserve_stock(
    product_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, sqlx::Error> {
    let remaining: Option<i64> = sqlx::query_scalar(
        r#"
            UPDATE products SET stock = stock - $1, updated_at = $2
            WHERE id = $3 AND is_active = 1 AND stock >= $1
            RETURNING stock;
        "#,
    )
    .bind(quantity)
    .bind(now)
    .bind(product_id)
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Reserve {quantity} x {product_id}: {remaining:?} remaining");
    Ok(remaining)
}

/// The stock that could be reserved right now. Missing and inactive products have none.
pub async fn available_stock(product_id: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 AND is_active = 1")
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(stock.unwrap_or(0))
}

pub async fn fetch_product(product_id: &str, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product = sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(product_id).fetch_optional(conn).await?;
    Ok(product)
}

pub async fn upsert_product(
    product: NewProduct,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Product, sqlx::Error> {
    let product = sqlx::query_as(
        r#"
            INSERT INTO products (id, name, price, stock, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                stock = excluded.stock,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(product.id)
    .bind(product.name)
    .bind(product.price)
    .bind(product.stock)
    .bind(product.is_active)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(product)
}
