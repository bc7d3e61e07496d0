//! # Backend contracts
//!
//! The traits in this module define what a database backend must provide in order to drive the fulfillment engine.
//!
//! * [`FulfillmentDatabase`] holds every operation that mutates order state. Each method is a single atomic unit of
//!   work: it either completes entirely, or leaves the store untouched.
//! * [`OrderManagement`] is the read side: fetching orders, line items, QR artifacts and products. It is split out so
//!   that query-only consumers (and their tests) need not provide the write side.
//! * [`SubscriberCounter`] tracks live membership of a broadcast group, so that a membership cap can be enforced by
//!   every server process sharing the store.
mod data_objects;
mod fulfillment_database;
mod order_management;
mod subscriber_counter;

pub use data_objects::{CodConfirmation, CustomerReceipt, StatusChange};
pub use fulfillment_database::{FulfillmentDatabase, FulfillmentError};
pub use order_management::{OrderManagement, OrderQueryError};
pub use subscriber_counter::SubscriberCounter;
