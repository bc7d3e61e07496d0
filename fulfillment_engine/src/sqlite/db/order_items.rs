use sqlx::SqliteConnection;

use crate::db_types::{CartLine, OrderItem};

pub async fn insert_item(order_id: i64, line: &CartLine, conn: &mut SqliteConnection) -> Result<OrderItem, sqlx::Error> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO order_items (order_id, product_id, product_name, product_price, quantity, subtotal)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(&line.product_id)
    .bind(&line.name)
    .bind(line.price)
    .bind(line.quantity)
    .bind(line.subtotal())
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_items_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}
