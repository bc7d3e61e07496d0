//! Order Fulfillment Engine
//!
//! This library holds the core of the order fulfillment pipeline: taking retail orders from checkout to delivery,
//! for both pre-paid (QR transfer) and cash-on-delivery orders. It is independent of any HTTP framework.
//!
//! The library is divided into these main sections:
//! 1. The data types stored in the database ([`mod@db_types`]), including the order status state machine.
//! 2. Backend contracts ([`mod@traits`]) and the SQLite backend ([`SqliteDatabase`]). Order intake, payment
//!    confirmation and status changes each run as a single transaction, so stock can never be oversold and an order
//!    is never half-created.
//! 3. The public API ([`OrderFlowApi`], [`PaymentApi`] and [`OrderQueryApi`]). You should use these rather than the
//!    backend directly.
//!
//! The engine also publishes events (`new_order`, `status_changed` and `payment_confirmed`) once changes have been
//! committed. A simple actor framework in [`mod@events`] lets you hook into these events to notify dashboards or
//! messaging channels. Delivery is best-effort.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

mod fe_api;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use fe_api::{
    order_flow_api::OrderFlowApi,
    order_objects,
    order_query_api::OrderQueryApi,
    payment_api::{cod_confirmation_url, render_confirmation_qr, PaymentApi, PaymentQrImage},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{FulfillmentDatabase, FulfillmentError, OrderManagement, OrderQueryError, SubscriberCounter};
