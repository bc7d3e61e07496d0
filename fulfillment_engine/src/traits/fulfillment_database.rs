use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        NewOrder,
        NewProduct,
        Order,
        OrderItem,
        OrderNumber,
        OrderQrCode,
        OrderStatusType,
        Product,
        StockShortfall,
        TransitionError,
    },
    helpers::{AnomalyRules, QrImageError},
    traits::{
        data_objects::{CodConfirmation, CustomerReceipt, StatusChange},
        OrderManagement,
        OrderQueryError,
    },
};

/// This trait defines every state-changing operation of the order store.
///
/// Each method runs as a single database transaction. External calls (payment gateway, messaging bot) never happen
/// inside these methods, and events are published by the caller only once the method has returned successfully.
#[allow(async_fn_in_trait)]
pub trait FulfillmentDatabase: Clone + OrderManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Takes a validated order, and in a single atomic transaction:
    /// * reserves stock for every cart line, in ascending product-id order. If any product is short, nothing is
    ///   reserved and every shortfall is reported in [`FulfillmentError::InsufficientStock`];
    /// * creates or refreshes the customer record for the (normalized) phone number;
    /// * allocates the next order number and stores the order with its initial status;
    /// * runs the anomaly rules against the customer's history and records the verdict;
    /// * stores the line item snapshots.
    async fn create_order(
        &self,
        order: NewOrder,
        rules: &AnomalyRules,
    ) -> Result<(Order, Vec<OrderItem>), FulfillmentError>;

    /// Moves the order to `new_status` if the state machine allows it. Entering `delivered` also sets the
    /// customer-received flag if it isn't set yet.
    ///
    /// The update only applies if the status is unchanged since it was read, so concurrent updates cannot both succeed.
    async fn update_order_status(
        &self,
        order_number: &OrderNumber,
        new_status: OrderStatusType,
        actor: &str,
    ) -> Result<StatusChange, FulfillmentError>;

    /// Records that cash was collected for a cash-on-delivery order.
    ///
    /// This is idempotent. If the payment was already recorded, the order is returned unchanged with
    /// `already_confirmed` set. A `pending` order moves to `confirmed`. The customer-received flag is never touched.
    async fn confirm_cod_payment(
        &self,
        order_number: &OrderNumber,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<CodConfirmation, FulfillmentError>;

    /// Records that the customer has physically received the goods. Status and payment fields are untouched.
    async fn mark_customer_received(
        &self,
        order_number: &OrderNumber,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<CustomerReceipt, FulfillmentError>;

    /// Stores a QR artifact for the order, valid from `now` for [`crate::db_types::QR_CODE_VALIDITY`].
    ///
    /// If the order already has an artifact, it is returned as-is and the boolean is false.
    async fn insert_qr_code(
        &self,
        order_id: i64,
        qr_data: &str,
        image: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<(OrderQrCode, bool), FulfillmentError>;

    /// Marks the order's QR artifact as used. Marking an already-used artifact leaves the original `used_at` in place.
    async fn mark_qr_code_used(&self, order_id: i64) -> Result<Option<OrderQrCode>, FulfillmentError>;

    /// Deletes QR artifacts that expired before `expired_before`. Returns the number of rows deleted.
    async fn delete_expired_qr_codes(&self, expired_before: DateTime<Utc>) -> Result<u64, FulfillmentError>;

    /// Administrative restocking: inserts the product, or replaces its name, price, stock and active flag.
    async fn upsert_product(&self, product: NewProduct) -> Result<Product, FulfillmentError>;
}

#[derive(Debug, Clone, Error)]
pub enum FulfillmentError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("Insufficient stock for {} item(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),
    #[error("{0}")]
    InvalidTransition(#[from] TransitionError),
    #[error("Order {0} not found")]
    OrderNotFound(OrderNumber),
    #[error("No QR code has been issued for order {0}")]
    QrCodeNotFound(OrderNumber),
    #[error("Could not create the order. {0}")]
    OrderCreationFailure(String),
    #[error("Order {0} has been cancelled and cannot be confirmed")]
    OrderCancelled(OrderNumber),
    #[error("Order {0} is not a cash-on-delivery order")]
    NotCashOnDelivery(OrderNumber),
    #[error("Could not render the QR code. {0}")]
    QrRenderError(String),
}

impl From<sqlx::Error> for FulfillmentError {
    fn from(e: sqlx::Error) -> Self {
        FulfillmentError::DatabaseError(e.to_string())
    }
}

impl From<OrderQueryError> for FulfillmentError {
    fn from(e: OrderQueryError) -> Self {
        match e {
            OrderQueryError::DatabaseError(s) => FulfillmentError::DatabaseError(s),
            OrderQueryError::QueryError(s) => FulfillmentError::ValidationError(s),
        }
    }
}

impl From<QrImageError> for FulfillmentError {
    fn from(e: QrImageError) -> Self {
        FulfillmentError::QrRenderError(e.to_string())
    }
}
