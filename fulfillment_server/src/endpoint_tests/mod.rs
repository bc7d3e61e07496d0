mod bot_webhook;
mod fulfillment;
mod helpers;
mod mocks;
mod orders;
mod orders_ws;
