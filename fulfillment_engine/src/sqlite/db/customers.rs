use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::Customer;

pub async fn fetch_customer_by_phone(phone: &str, conn: &mut SqliteConnection) -> Result<Option<Customer>, sqlx::Error> {
    let customer =
        sqlx::query_as("SELECT * FROM customers WHERE phone = $1").bind(phone).fetch_optional(conn).await?;
    Ok(customer)
}

/// Creates the customer for `phone`, or refreshes the name, address and province of the existing one if any of them
/// changed. `phone` must already be normalized.
pub async fn upsert_customer(
    name: &str,
    phone: &str,
    address: &str,
    province: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Customer, sqlx::Error> {
    let changed: Option<Customer> = sqlx::query_as(
        r#"
            INSERT INTO customers (name, phone, address, province, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (phone) DO UPDATE SET
                name = excluded.name,
                address = excluded.address,
                province = excluded.province,
                updated_at = excluded.updated_at
            WHERE name IS NOT excluded.name OR address IS NOT excluded.address OR province IS NOT excluded.province
            RETURNING *;
        "#,
    )
    .bind(name)
    .bind(phone)
    .bind(address)
    .bind(province)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;
    match changed {
        Some(customer) => Ok(customer),
        // Nothing changed, so the upsert returned no row
        None => fetch_customer_by_phone(phone, conn).await?.ok_or(sqlx::Error::RowNotFound),
    }
}
