//! # Order fulfillment server
//! This crate hosts the HTTP front end of the order fulfillment pipeline. It is responsible for:
//! * Taking orders from checkout and handing them to the fulfillment engine.
//! * Confirming cash-on-delivery payments, and serving and issuing payment QR codes.
//! * Proxying KHQR requests to the payment gateway.
//! * Streaming order events to staff dashboards over a websocket, and to staff chats through a messaging bot.
//! * Accepting bot webhook updates, so that staff can move orders along from their chat.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `GET /health`: A health check route that returns a 200 OK response.
//! * `POST /order/create`: Order intake.
//! * `GET /order/{order_number}`, `GET /orders`: Order lookup and search.
//! * `POST /order/{order_number}/status`, `POST /order/{order_number}/received`: Staff order updates.
//! * `POST /payment/cod/confirm`: Cash-on-delivery confirmation.
//! * `GET /payment/qr/{order_number}`, `POST /payment/qr/issue`: Payment QR codes.
//! * `GET /payment/khqr/create`, `GET /payment/khqr/check`: The payment gateway proxy.
//! * `GET /ws/orders`: Live order updates.
//! * `POST /bot/webhook`: Messaging bot updates.
pub mod bot;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod gateway;
pub mod qr_cleanup_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
