use thiserror::Error;

use crate::{
    db_types::{Customer, Order, OrderItem, OrderNumber, OrderQrCode, Product},
    order_objects::OrderQueryFilter,
};

#[derive(Debug, Clone, Error)]
pub enum OrderQueryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for OrderQueryError {
    fn from(e: sqlx::Error) -> Self {
        OrderQueryError::DatabaseError(e.to_string())
    }
}

/// Read-only queries over the order store.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, OrderQueryError>;

    /// Line items for the order with the given internal id, in insertion order.
    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderQueryError>;

    /// Orders matching every field set in the filter, newest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderQueryError>;

    async fn fetch_qr_code(&self, order_id: i64) -> Result<Option<OrderQrCode>, OrderQueryError>;

    async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>, OrderQueryError>;

    /// Look up a customer by phone number. The phone is normalized before matching.
    async fn fetch_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, OrderQueryError>;
}
