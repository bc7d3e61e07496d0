use std::sync::Arc;

use futures::future::BoxFuture;
use fulfillment_engine::events::{EventHandlers, EventHooks, OrderEvent};
use log::*;

use crate::bot::{
    api::{BotApi, InlineKeyboard},
    format::{new_order_message, order_keyboard, payment_confirmed_notice, plain_text_notice, status_changed_notice},
};

pub const BOT_EVENT_BUFFER_SIZE: usize = 25;

/// Posts order events to the configured chats.
///
/// * `new_order` posts the full order with buttons for the next status.
/// * `status_changed` and `payment_confirmed` post a short notice.
///
/// If a formatted message is refused, a plain-text version is sent instead. Failures never propagate: the order
/// operation that raised the event has already been committed.
pub fn create_bot_event_handlers(api: BotApi, chat_ids: Vec<String>) -> EventHandlers {
    let mut hooks = EventHooks::default();
    let chat_ids = Arc::new(chat_ids);
    hooks.on_any_event(move |event| {
        if chat_ids.is_empty() {
            return no_op();
        }
        let api = api.clone();
        let chat_ids = Arc::clone(&chat_ids);
        Box::pin(async move {
            let (text, keyboard) = rich_message(&event);
            for chat_id in chat_ids.iter() {
                notify_chat(&api, chat_id, &text, keyboard.as_ref(), &event).await;
            }
        })
    });
    EventHandlers::new(BOT_EVENT_BUFFER_SIZE, hooks)
}

fn rich_message(event: &OrderEvent) -> (String, Option<InlineKeyboard>) {
    match event {
        OrderEvent::NewOrder(e) => (new_order_message(e), Some(order_keyboard(&e.order))),
        OrderEvent::StatusChanged(e) => (status_changed_notice(e), None),
        OrderEvent::PaymentConfirmed(e) => (payment_confirmed_notice(e), None),
    }
}

async fn notify_chat(api: &BotApi, chat_id: &str, text: &str, keyboard: Option<&InlineKeyboard>, event: &OrderEvent) {
    let order_number = &event.order().order_number;
    let Err(e) = api.send_message(chat_id, text, keyboard).await else {
        debug!("🤖️ Sent {} notification for {order_number} to chat {chat_id}", event.event_type());
        return;
    };
    warn!("🤖️ Could not send the {} notification for {order_number} to {chat_id}. {e}", event.event_type());
    match api.send_plain_message(chat_id, &plain_text_notice(event)).await {
        Ok(()) => debug!("🤖️ Sent the plain-text notification for {order_number} to chat {chat_id}"),
        Err(e) => error!("🤖️ Giving up on the notification for {order_number} to chat {chat_id}. {e}"),
    }
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}
