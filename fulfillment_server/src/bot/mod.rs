//! # Messaging bot
//!
//! Order notifications for staff, delivered through a Telegram-compatible bot API, and the webhook that lets staff
//! act on orders from their chat.
//!
//! * [`api`] is the HTTP client for the bot API.
//! * [`format`] renders orders and events as HTML messages with inline action buttons.
//! * [`notifier`] registers the event hooks that post to the configured chats. Delivery is best-effort: failures are
//!   logged and never reach the order operation that triggered them.
//! * [`webhook`] parses inbound updates (commands and button presses) and works out the replies.
pub mod api;
pub mod format;
pub mod notifier;
pub mod webhook;

pub use api::{BotApi, BotApiError, InlineButton, InlineKeyboard};
pub use notifier::create_bot_event_handlers;
pub use webhook::{
    BotCommand,
    BotUpdate,
    BotWebhookHandler,
    CallbackAction,
    OutgoingMessage,
    RawUpdate,
    WebhookReply,
};
