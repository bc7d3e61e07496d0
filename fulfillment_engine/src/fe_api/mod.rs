//! # Fulfillment engine public API
//!
//! The `fe_api` module exposes the programmatic API of the fulfillment engine. The API is split by concern, so that
//! clients can pick the parts they need:
//!
//! * [`order_flow_api`] is the order intake entry point, and drives staff status changes.
//! * [`payment_api`] confirms cash-on-delivery payments and manages the QR payment artifacts.
//! * [`order_query_api`] provides read-only access to orders, and only needs an [`OrderManagement`] backend.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits the API needs,
//! plus the event producers that should hear about changes.
//!
//! ```rust,ignore
//! use fulfillment_engine::{OrderFlowApi, SqliteDatabase, events::EventProducers};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = OrderFlowApi::new(db, EventProducers::default());
//! let order = api.create_order(new_order).await?;
//! ```
use log::*;

use crate::{db_types::Order, order_objects::OrderSnapshot, traits::OrderManagement};

pub mod order_flow_api;
pub mod order_objects;
pub mod order_query_api;
pub mod payment_api;

/// Builds the snapshot that is attached to an event. Events are best-effort, so failing to load the line items is
/// logged and the snapshot is sent without them.
pub(crate) async fn event_snapshot<B: OrderManagement>(db: &B, order: Order) -> OrderSnapshot {
    let items = match db.fetch_order_items(order.id).await {
        Ok(items) => items,
        Err(e) => {
            warn!("📬️ Could not load the items of order {} for an event. {e}", order.order_number);
            Vec::new()
        },
    };
    OrderSnapshot::new(order, &items)
}
