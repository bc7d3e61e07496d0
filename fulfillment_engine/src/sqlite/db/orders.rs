use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderNumber, OrderStatusType, AUTO_RECEIVED_ACTOR, ORDER_NUMBER_PREFIX},
    helpers::CustomerHistory,
    order_objects::OrderQueryFilter,
};

/// The highest sequence number among existing order numbers of the form `MD<digits>`. Order numbers that don't fit
/// that shape are ignored.
pub async fn last_order_sequence(conn: &mut SqliteConnection) -> Result<Option<i64>, sqlx::Error> {
    let start = ORDER_NUMBER_PREFIX.len() as i64 + 1;
    let seq: Option<i64> = sqlx::query_scalar(
        r#"
            SELECT MAX(CAST(SUBSTR(order_number, $1) AS INTEGER)) FROM orders
            WHERE order_number GLOB $2 AND SUBSTR(order_number, $1) NOT GLOB '*[^0-9]*';
        "#,
    )
    .bind(start)
    .bind(format!("{ORDER_NUMBER_PREFIX}[0-9]*"))
    .fetch_one(conn)
    .await?;
    Ok(seq)
}

/// Inserts a new order row. This is not atomic. Call it inside a transaction, passing `&mut *tx` as the connection.
///
/// `phone` is the normalized phone number, which is what the customer snapshot stores.
pub async fn insert_order(
    order: &NewOrder,
    order_number: &OrderNumber,
    customer_id: i64,
    phone: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                customer_id,
                customer_name,
                customer_phone,
                customer_address,
                customer_province,
                subtotal,
                discount,
                shipping,
                total,
                payment_method,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING *;
        "#,
    )
    .bind(order_number)
    .bind(customer_id)
    .bind(order.name.trim())
    .bind(phone)
    .bind(order.address.trim())
    .bind(order.province.trim())
    .bind(order.subtotal)
    .bind(order.discount)
    .bind(order.shipping)
    .bind(order.total)
    .bind(order.payment_method)
    .bind(order.payment_method.initial_status())
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Gathers the customer's order history for the anomaly rules. The order with id `exclude_id` is never counted.
pub async fn customer_history(
    phone: &str,
    customer_id: i64,
    exclude_id: i64,
    recent_since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CustomerHistory, sqlx::Error> {
    let distinct_names: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT customer_name) FROM orders WHERE customer_phone = $1 AND id != $2")
            .bind(phone)
            .bind(exclude_id)
            .fetch_one(&mut *conn)
            .await?;
    let recent_orders: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE customer_phone = $1 AND id != $2 AND created_at >= $3",
    )
    .bind(phone)
    .bind(exclude_id)
    .bind(recent_since)
    .fetch_one(&mut *conn)
    .await?;
    let prior_orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE customer_id = $1 AND id != $2")
        .bind(customer_id)
        .bind(exclude_id)
        .fetch_one(conn)
        .await?;
    Ok(CustomerHistory { distinct_names, recent_orders, prior_orders })
}

pub async fn flag_suspicious(
    id: i64,
    reason: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                is_suspicious = 1,
                suspicious_reason = $1,
                verification_status = 'suspicious',
                updated_at = $2
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(reason)
    .bind(now)
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order_by_number(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Sets the order status to `new`, but only if it is currently `old`. Returns `None` if the order is missing or its
/// status has moved on.
pub async fn update_status_if(
    order_number: &OrderNumber,
    old: OrderStatusType,
    new: OrderStatusType,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = $2 WHERE order_number = $3 AND status = $4 RETURNING *",
    )
    .bind(new)
    .bind(now)
    .bind(order_number)
    .bind(old)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Sets the customer-received fields on behalf of the system, if they are not set already.
pub async fn auto_mark_received(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                customer_received = 1,
                customer_received_at = $1,
                customer_received_by = $2,
                updated_at = $1
            WHERE id = $3 AND customer_received = 0
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(AUTO_RECEIVED_ACTOR)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Moves an unpaid, pending cash-on-delivery order to `confirmed`. Returns true if the status changed.
pub async fn confirm_pending_cod_order(
    order_number: &OrderNumber,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE orders SET status = 'confirmed', updated_at = $1
            WHERE order_number = $2
                AND status = 'pending'
                AND payment_received = 0
                AND payment_method = 'Cash on Delivery';
        "#,
    )
    .bind(now)
    .bind(order_number)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Records the cash payment for a cash-on-delivery order. The payment-received flag is part of the predicate, so the
/// update applies at most once. Notes are appended to any existing notes. Returns `None` if the update did not apply.
pub async fn record_cod_payment(
    order_number: &OrderNumber,
    actor: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let notes = notes.map(str::trim).filter(|n| !n.is_empty());
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                payment_received = 1,
                payment_received_at = $1,
                payment_received_by = $2,
                cod_notes = CASE
                    WHEN $3 IS NULL THEN cod_notes
                    WHEN cod_notes IS NULL OR cod_notes = '' THEN $3
                    ELSE cod_notes || char(10) || $3
                END,
                updated_at = $1
            WHERE order_number = $4
                AND payment_received = 0
                AND payment_method = 'Cash on Delivery'
                AND status != 'cancelled'
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(actor)
    .bind(notes)
    .bind(order_number)
    .fetch_optional(conn)
    .await?;
    debug!("🗃️ COD payment update for {order_number} applied: {}", order.is_some());
    Ok(order)
}

/// Records the physical handover of the goods. Returns `None` if the order is missing or was already marked received.
pub async fn mark_customer_received(
    order_number: &OrderNumber,
    actor: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                customer_received = 1,
                customer_received_at = $1,
                customer_received_by = $2,
                customer_received_notes = $3,
                updated_at = $1
            WHERE order_number = $4 AND customer_received = 0
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(actor)
    .bind(notes)
    .bind(order_number)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in descending order (newest first)
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let limit = query.effective_limit();
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_number) = query.order_number {
        where_clause.push("order_number = ");
        where_clause.push_bind_unseparated(order_number);
    }
    if let Some(phone) = query.phone {
        where_clause.push("customer_phone = ");
        where_clause.push_bind_unseparated(phone);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        for (i, status) in statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if let Some(suspicious) = query.suspicious {
        where_clause.push("is_suspicious = ");
        where_clause.push_bind_unseparated(suspicious);
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    builder.push_bind(limit);

    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {}", orders.len());
    Ok(orders)
}
