//! `SqliteDatabase` is a concrete implementation of a fulfillment engine backend.
//!
//! It implements all the traits defined in the [`crate::traits`] module.
//!
//! SQLite allows a single writer at a time. Every transaction in this module starts with a write, so it holds the
//! write lock from its first statement until commit, and concurrent writers queue on the busy timeout rather than
//! deadlocking on a shared-to-reserved lock upgrade.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use fulfillment_common::helpers::normalize_phone;
use log::*;
use sqlx::{migrate::MigrateError, SqliteConnection, SqlitePool};

use super::db::{customers, db_url, new_pool, order_items, orders, products, qr_codes, subscribers};
use crate::{
    db_types::{
        Customer,
        NewOrder,
        NewProduct,
        Order,
        OrderItem,
        OrderNumber,
        OrderQrCode,
        OrderStatusType,
        Product,
        StockShortfall,
    },
    helpers::AnomalyRules,
    order_objects::OrderQueryFilter,
    traits::{
        CodConfirmation,
        CustomerReceipt,
        FulfillmentDatabase,
        FulfillmentError,
        OrderManagement,
        OrderQueryError,
        StatusChange,
        SubscriberCounter,
    },
};

/// How many times a status update is retried when another writer changes the status between our read and our write.
const STATUS_UPDATE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl FulfillmentDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order(
        &self,
        order: NewOrder,
        rules: &AnomalyRules,
    ) -> Result<(Order, Vec<OrderItem>), FulfillmentError> {
        order.validate().map_err(FulfillmentError::ValidationError)?;
        let mut tx = self.pool.begin().await.map_err(creation_failure)?;
        let result = create_order_in_tx(order, rules, Utc::now(), &mut tx).await;
        match result {
            Ok(created) => {
                tx.commit().await.map_err(creation_failure)?;
                Ok(created)
            },
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!("🗃️ Rolling back the order intake failed: {rb}");
                }
                match e {
                    FulfillmentError::DatabaseError(s) => Err(FulfillmentError::OrderCreationFailure(s)),
                    other => Err(other),
                }
            },
        }
    }

    async fn update_order_status(
        &self,
        order_number: &OrderNumber,
        new_status: OrderStatusType,
        actor: &str,
    ) -> Result<StatusChange, FulfillmentError> {
        for attempt in 1..=STATUS_UPDATE_ATTEMPTS {
            // The read happens outside the transaction; the update below only applies if the status is unchanged.
            let current = self
                .fetch_order_by_number(order_number)
                .await?
                .ok_or_else(|| FulfillmentError::OrderNotFound(order_number.clone()))?;
            let old_status = current.status;
            old_status.validate_transition(new_status)?;
            let now = Utc::now();
            let mut tx = self.pool.begin().await?;
            let Some(mut order) = orders::update_status_if(order_number, old_status, new_status, now, &mut tx).await?
            else {
                tx.rollback().await?;
                debug!("🗃️ Status of {order_number} changed while updating it (attempt {attempt}). Retrying.");
                continue;
            };
            let mut auto_received = false;
            if new_status == OrderStatusType::Delivered {
                if let Some(received) = orders::auto_mark_received(order.id, now, &mut tx).await? {
                    order = received;
                    auto_received = true;
                }
            }
            tx.commit().await?;
            info!("🗃️ Order {order_number} moved from {old_status} to {new_status} by {actor}");
            return Ok(StatusChange { old_status, order, auto_received });
        }
        Err(FulfillmentError::DatabaseError(format!(
            "The status of {order_number} kept changing during the update. Gave up after {STATUS_UPDATE_ATTEMPTS} \
             attempts"
        )))
    }

    async fn confirm_cod_payment(
        &self,
        order_number: &OrderNumber,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<CodConfirmation, FulfillmentError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let moved = orders::confirm_pending_cod_order(order_number, now, &mut tx).await?;
        if let Some(order) = orders::record_cod_payment(order_number, actor, notes, now, &mut tx).await? {
            tx.commit().await?;
            info!("🗃️ Cash payment for {order_number} received by {actor}");
            let previous_status = moved.then_some(OrderStatusType::Pending);
            return Ok(CodConfirmation { order, already_confirmed: false, previous_status });
        }
        tx.rollback().await?;
        // The update did not apply. Work out why from the current state.
        let order = self
            .fetch_order_by_number(order_number)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_number.clone()))?;
        if order.payment_received {
            debug!("🗃️ Cash payment for {order_number} was already recorded");
            Ok(CodConfirmation { order, already_confirmed: true, previous_status: None })
        } else if !order.is_cash_on_delivery() {
            Err(FulfillmentError::NotCashOnDelivery(order_number.clone()))
        } else if order.status == OrderStatusType::Cancelled {
            Err(FulfillmentError::OrderCancelled(order_number.clone()))
        } else {
            Err(FulfillmentError::DatabaseError(format!("Cash payment for {order_number} could not be recorded")))
        }
    }

    async fn mark_customer_received(
        &self,
        order_number: &OrderNumber,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<CustomerReceipt, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(order) = orders::mark_customer_received(order_number, actor, notes, Utc::now(), &mut conn).await? {
            info!("🗃️ Customer received order {order_number}. Confirmed by {actor}");
            return Ok(CustomerReceipt { order, already_received: false });
        }
        let order = orders::fetch_order_by_number(order_number, &mut conn)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_number.clone()))?;
        Ok(CustomerReceipt { order, already_received: true })
    }

    async fn insert_qr_code(
        &self,
        order_id: i64,
        qr_data: &str,
        image: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<(OrderQrCode, bool), FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(qr) = qr_codes::insert_qr_code(order_id, qr_data, image, now, &mut conn).await? {
            debug!("🗃️ QR code stored for order #{order_id}. Expires at {}", qr.expires_at);
            return Ok((qr, true));
        }
        let existing = qr_codes::fetch_qr_code(order_id, &mut conn).await?.ok_or_else(|| {
            FulfillmentError::DatabaseError(format!("QR code for order #{order_id} disappeared after a conflict"))
        })?;
        Ok((existing, false))
    }

    async fn mark_qr_code_used(&self, order_id: i64) -> Result<Option<OrderQrCode>, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        let qr = qr_codes::mark_used(order_id, Utc::now(), &mut conn).await?;
        Ok(qr)
    }

    async fn delete_expired_qr_codes(&self, expired_before: DateTime<Utc>) -> Result<u64, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        let n = qr_codes::delete_expired(expired_before, &mut conn).await?;
        Ok(n)
    }

    async fn upsert_product(&self, product: NewProduct) -> Result<Product, FulfillmentError> {
        if product.stock < 0 || product.price.is_negative() {
            return Err(FulfillmentError::ValidationError(format!(
                "Product {} cannot have negative stock or price",
                product.id
            )));
        }
        let mut conn = self.pool.acquire().await?;
        let product = products::upsert_product(product, Utc::now(), &mut conn).await?;
        Ok(product)
    }
}

/// The body of the order intake transaction. Any error returned here rolls back every change made so far.
async fn create_order_in_tx(
    order: NewOrder,
    rules: &AnomalyRules,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(Order, Vec<OrderItem>), FulfillmentError> {
    // Stock first. This is the first write of the transaction, and takes the database write lock.
    let mut shortfalls = Vec::new();
    for (product_id, reservation) in order.reservations() {
        match products::reserve_stock(&product_id, reservation.quantity, now, conn).await? {
            Some(_) => {},
            None => {
                let available = products::available_stock(&product_id, conn).await?;
                shortfalls.push(StockShortfall {
                    id: product_id,
                    name: reservation.name,
                    available,
                    requested: reservation.quantity,
                });
            },
        }
    }
    if !shortfalls.is_empty() {
        info!("🗃️ Order rejected. {} product(s) are short of stock", shortfalls.len());
        return Err(FulfillmentError::InsufficientStock(shortfalls));
    }

    let phone = order.normalized_phone();
    let customer =
        customers::upsert_customer(order.name.trim(), &phone, order.address.trim(), order.province.trim(), now, conn)
            .await?;

    let order_number = OrderNumber::next_after(orders::last_order_sequence(conn).await?);
    let mut new_order = orders::insert_order(&order, &order_number, customer.id, &phone, now, conn).await?;
    debug!("🗃️ Order {order_number} has been saved in the DB with id {}", new_order.id);

    let history = orders::customer_history(&phone, customer.id, new_order.id, now - rules.burst_window, conn).await?;
    let report = rules.evaluate(&new_order, &history);
    if let Some(reason) = report.reason() {
        warn!("🗃️ Order {order_number} flagged as suspicious: {reason}");
        new_order = orders::flag_suspicious(new_order.id, &reason, now, conn).await?;
    }

    let mut items = Vec::with_capacity(order.items.len());
    for line in &order.items {
        items.push(order_items::insert_item(new_order.id, line, conn).await?);
    }
    Ok((new_order, items))
}

fn creation_failure(e: sqlx::Error) -> FulfillmentError {
    FulfillmentError::OrderCreationFailure(e.to_string())
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_number(order_number, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        let items = order_items::fetch_items_for_order(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_qr_code(&self, order_id: i64) -> Result<Option<OrderQrCode>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        let qr = qr_codes::fetch_qr_code(order_id, &mut conn).await?;
        Ok(qr)
    }

    async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::fetch_product(product_id, &mut conn).await?;
        Ok(product)
    }

    async fn fetch_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        let customer = customers::fetch_customer_by_phone(&normalize_phone(phone), &mut conn).await?;
        Ok(customer)
    }
}

impl SubscriberCounter for SqliteDatabase {
    async fn try_join(&self, group: &str, max: i64) -> Result<Option<i64>, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let count = subscribers::try_join(group, max, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn leave(&self, group: &str) -> Result<i64, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        let count = subscribers::leave(group, Utc::now(), &mut conn).await?;
        Ok(count)
    }

    async fn reset_subscribers(&self, group: &str) -> Result<(), FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        subscribers::reset(group, Utc::now(), &mut conn).await?;
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Migrations complete");
        Ok(())
    }
}
