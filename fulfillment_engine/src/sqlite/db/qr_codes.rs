use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{OrderQrCode, QR_CODE_VALIDITY};

/// Stores a QR artifact for the order, unless one already exists. Returns `None` if the order already had one.
pub async fn insert_qr_code(
    order_id: i64,
    qr_data: &str,
    image: Vec<u8>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderQrCode>, sqlx::Error> {
    let qr = sqlx::query_as(
        r#"
            INSERT INTO order_qr_codes (order_id, qr_data, image, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(qr_data)
    .bind(image)
    .bind(now)
    .bind(now + QR_CODE_VALIDITY)
    .fetch_optional(conn)
    .await?;
    Ok(qr)
}

pub async fn fetch_qr_code(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<OrderQrCode>, sqlx::Error> {
    let qr = sqlx::query_as("SELECT * FROM order_qr_codes WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(qr)
}

/// Marks the artifact as used. The first `used_at` timestamp is kept if it was already used.
pub async fn mark_used(
    order_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderQrCode>, sqlx::Error> {
    let qr = sqlx::query_as(
        "UPDATE order_qr_codes SET is_used = 1, used_at = COALESCE(used_at, $1) WHERE order_id = $2 RETURNING *",
    )
    .bind(now)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(qr)
}

pub async fn delete_expired(expired_before: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM order_qr_codes WHERE expires_at < $1").bind(expired_before).execute(conn).await?;
    Ok(result.rows_affected())
}
