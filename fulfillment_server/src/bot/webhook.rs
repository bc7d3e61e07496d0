use std::str::FromStr;

use fulfillment_engine::{
    cod_confirmation_url,
    db_types::{OrderNumber, OrderStatusType},
    order_objects::{OrderQueryFilter, OrderSnapshot},
    FulfillmentDatabase,
    FulfillmentError,
    OrderFlowApi,
    OrderQueryApi,
};
use log::*;
use serde::Deserialize;

use crate::bot::{
    api::{BotApi, InlineKeyboard},
    format::{
        cod_qr_message,
        format_order_message,
        listing_header,
        order_keyboard,
        status_updated_message,
        HELP_TEXT,
    },
};

/// The actor recorded for changes made through the bot.
pub const BOT_ACTOR: &str = "Bot";
/// Listings never show more than this many orders.
pub const MAX_LISTED_ORDERS: i64 = 10;

//--------------------------------------      Raw updates      -------------------------------------------------------
/// The subset of the bot API's update object that the webhook reads.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUpdate {
    #[serde(default)]
    pub update_id: i64,
    pub message: Option<RawMessage>,
    pub callback_query: Option<RawCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub chat: RawChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCallbackQuery {
    pub id: String,
    pub message: Option<RawMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

//--------------------------------------       BotUpdate       -------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum BotUpdate {
    Command { chat_id: String, command: BotCommand },
    Callback { callback_id: String, chat_id: Option<String>, action: CallbackAction },
    /// Anything else, e.g. plain chat messages or edits
    Ignored,
}

impl From<RawUpdate> for BotUpdate {
    fn from(raw: RawUpdate) -> Self {
        if let Some(message) = raw.message {
            let command = message.text.as_deref().and_then(BotCommand::parse);
            return match command {
                Some(command) => Self::Command { chat_id: message.chat.id.to_string(), command },
                None => Self::Ignored,
            };
        }
        if let Some(callback) = raw.callback_query {
            let chat_id = callback.message.map(|m| m.chat.id.to_string());
            let action = CallbackAction::parse(callback.data.as_deref().unwrap_or_default());
            return Self::Callback { callback_id: callback.id, chat_id, action };
        }
        Self::Ignored
    }
}

//--------------------------------------      BotCommand       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderListing {
    ToPrepare,
    Preparing,
    Ready,
    OutForDelivery,
}

impl OrderListing {
    pub fn statuses(&self) -> &'static [OrderStatusType] {
        match self {
            Self::ToPrepare => &[OrderStatusType::Pending, OrderStatusType::Confirmed],
            Self::Preparing => &[OrderStatusType::Preparing],
            Self::Ready => &[OrderStatusType::ReadyForDelivery],
            Self::OutForDelivery => &[OrderStatusType::OutForDelivery],
        }
    }

    pub fn header(&self, count: usize) -> String {
        match self {
            Self::ToPrepare => listing_header("Orders to Prepare", "📋", count),
            Self::Preparing => listing_header("Currently Preparing", "👷", count),
            Self::Ready => listing_header("Ready for Delivery", "📦", count),
            Self::OutForDelivery => listing_header("Out for Delivery", "🚚", count),
        }
    }

    pub fn empty_message(&self) -> &'static str {
        match self {
            Self::ToPrepare => "✅ No orders to prepare. All caught up!",
            Self::Preparing => "📦 No orders currently being prepared.",
            Self::Ready => "✅ No orders ready for delivery.",
            Self::OutForDelivery => "🚚 No orders out for delivery.",
        }
    }

    pub fn filter(&self) -> OrderQueryFilter {
        self.statuses()
            .iter()
            .fold(OrderQueryFilter::default(), |f, s| f.with_status(*s))
            .with_limit(MAX_LISTED_ORDERS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Help,
    List(OrderListing),
    Order(OrderNumber),
    Unknown(String),
}

impl BotCommand {
    /// Parses a chat message. Returns `None` if the message is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }
        let (word, arg) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        // Commands in groups may be addressed to the bot, e.g. `/orders@shop_bot`
        let word = word.split('@').next().unwrap_or(word).to_lowercase();
        let command = match (word.as_str(), arg.trim()) {
            ("/start" | "/help", _) => Self::Help,
            ("/orders", _) => Self::List(OrderListing::ToPrepare),
            ("/preparing", _) => Self::List(OrderListing::Preparing),
            ("/ready", _) => Self::List(OrderListing::Ready),
            ("/out", _) => Self::List(OrderListing::OutForDelivery),
            ("/order", arg) if !arg.is_empty() => match OrderNumber::from_str(arg) {
                Ok(n) => Self::Order(n),
                Err(_) => Self::Unknown(text.to_string()),
            },
            _ => Self::Unknown(text.to_string()),
        };
        Some(command)
    }
}

//--------------------------------------    CallbackAction     -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    UpdateStatus { order_number: OrderNumber, status: OrderStatusType },
    QrLinks(OrderNumber),
    Unknown(String),
}

impl CallbackAction {
    /// Parses button data: `status_{order}_{status}` or `qr_{order}`.
    pub fn parse(data: &str) -> Self {
        if let Some(rest) = data.strip_prefix("status_") {
            let parsed = rest.split_once('_').and_then(|(n, s)| {
                let order_number = OrderNumber::from_str(n).ok()?;
                let status = OrderStatusType::from_str(s).ok()?;
                Some(Self::UpdateStatus { order_number, status })
            });
            return parsed.unwrap_or_else(|| Self::Unknown(data.to_string()));
        }
        if let Some(n) = data.strip_prefix("qr_") {
            if let Ok(order_number) = OrderNumber::from_str(n) {
                return Self::QrLinks(order_number);
            }
        }
        Self::Unknown(data.to_string())
    }
}

//--------------------------------------        Replies        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub chat_id: String,
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl OutgoingMessage {
    pub fn text<S: Into<String>>(chat_id: &str, text: S) -> Self {
        Self { chat_id: chat_id.to_string(), text: text.into(), keyboard: None }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard).filter(|k| !k.is_empty());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookReply {
    pub messages: Vec<OutgoingMessage>,
    /// The callback query to answer, with an optional toast
    pub callback_answer: Option<(String, Option<String>)>,
}

//--------------------------------------   BotWebhookHandler   -------------------------------------------------------
/// Works out the replies to inbound bot updates, and sends them.
pub struct BotWebhookHandler<B> {
    flow: OrderFlowApi<B>,
    queries: OrderQueryApi<B>,
    api: Option<BotApi>,
    public_base_url: String,
}

impl<B> BotWebhookHandler<B> {
    pub fn new(flow: OrderFlowApi<B>, queries: OrderQueryApi<B>, api: Option<BotApi>, public_base_url: &str) -> Self {
        let public_base_url = public_base_url.trim_end_matches('/').to_string();
        Self { flow, queries, api, public_base_url }
    }
}

impl<B> BotWebhookHandler<B>
where B: FulfillmentDatabase
{
    pub async fn handle(&self, update: BotUpdate) -> WebhookReply {
        match update {
            BotUpdate::Command { chat_id, command } => {
                let messages = self.handle_command(&chat_id, command).await;
                WebhookReply { messages, callback_answer: None }
            },
            BotUpdate::Callback { callback_id, chat_id, action } => {
                let (messages, toast) = match chat_id {
                    Some(chat_id) => self.handle_callback(&chat_id, action).await,
                    None => {
                        debug!("🤖️ Callback {callback_id} has no chat to reply to");
                        (Vec::new(), None)
                    },
                };
                WebhookReply { messages, callback_answer: Some((callback_id, toast)) }
            },
            BotUpdate::Ignored => WebhookReply::default(),
        }
    }

    async fn handle_command(&self, chat_id: &str, command: BotCommand) -> Vec<OutgoingMessage> {
        debug!("🤖️ Command from chat {chat_id}: {command:?}");
        match command {
            BotCommand::Help => vec![OutgoingMessage::text(chat_id, HELP_TEXT)],
            BotCommand::List(listing) => self.list_orders(chat_id, listing).await,
            BotCommand::Order(n) => match self.queries.order_snapshot(&n).await {
                Ok(Some(order)) => vec![order_message(chat_id, &order, true)],
                Ok(None) => vec![OutgoingMessage::text(chat_id, format!("❌ Order {n} not found."))],
                Err(e) => {
                    error!("🤖️ Could not fetch order {n}. {e}");
                    vec![OutgoingMessage::text(chat_id, "❌ Could not load the order. Please try again.")]
                },
            },
            BotCommand::Unknown(text) => {
                debug!("🤖️ Ignoring unknown command {text}");
                Vec::new()
            },
        }
    }

    async fn list_orders(&self, chat_id: &str, listing: OrderListing) -> Vec<OutgoingMessage> {
        let orders = match self.queries.search_orders(listing.filter()).await {
            Ok(orders) => orders,
            Err(e) => {
                error!("🤖️ Could not fetch the {listing:?} listing. {e}");
                return vec![OutgoingMessage::text(chat_id, "❌ Could not load orders. Please try again.")];
            },
        };
        if orders.is_empty() {
            return vec![OutgoingMessage::text(chat_id, listing.empty_message())];
        }
        let mut messages = vec![OutgoingMessage::text(chat_id, listing.header(orders.len()))];
        messages.extend(orders.iter().map(|o| order_message(chat_id, o, false)));
        messages
    }

    async fn handle_callback(&self, chat_id: &str, action: CallbackAction) -> (Vec<OutgoingMessage>, Option<String>) {
        debug!("🤖️ Button pressed in chat {chat_id}: {action:?}");
        match action {
            CallbackAction::UpdateStatus { order_number, status } => {
                self.update_status(chat_id, &order_number, status).await
            },
            CallbackAction::QrLinks(n) => (self.qr_links(chat_id, &n).await, None),
            CallbackAction::Unknown(data) => {
                debug!("🤖️ Ignoring unknown callback data {data}");
                (Vec::new(), None)
            },
        }
    }

    async fn update_status(
        &self,
        chat_id: &str,
        n: &OrderNumber,
        status: OrderStatusType,
    ) -> (Vec<OutgoingMessage>, Option<String>) {
        match self.flow.update_status(n, status, BOT_ACTOR).await {
            Ok(change) => {
                let order = match self.queries.order_snapshot(n).await {
                    Ok(Some(order)) => order,
                    _ => OrderSnapshot::new(change.order, &[]),
                };
                let toast = format!("{n}: {}", order.status.display_name());
                let messages = vec![
                    OutgoingMessage::text(chat_id, status_updated_message(&order)),
                    order_message(chat_id, &order, true),
                ];
                (messages, Some(toast))
            },
            Err(FulfillmentError::InvalidTransition(e)) => {
                info!("🤖️ Bot request to move {n} was refused. {e}");
                let text = format!("❌ Cannot update order #{n}. {e}");
                (vec![OutgoingMessage::text(chat_id, text)], Some("Not allowed".to_string()))
            },
            Err(FulfillmentError::OrderNotFound(_)) => {
                (vec![OutgoingMessage::text(chat_id, format!("❌ Order {n} not found."))], None)
            },
            Err(e) => {
                error!("🤖️ Could not update order {n} to {status}. {e}");
                let text = format!("❌ Could not update order #{n}. Please try again.");
                (vec![OutgoingMessage::text(chat_id, text)], None)
            },
        }
    }

    async fn qr_links(&self, chat_id: &str, n: &OrderNumber) -> Vec<OutgoingMessage> {
        let order = match self.queries.order_snapshot(n).await {
            Ok(Some(order)) => order,
            Ok(None) => return vec![OutgoingMessage::text(chat_id, format!("❌ Order {n} not found."))],
            Err(e) => {
                error!("🤖️ Could not fetch order {n}. {e}");
                return vec![OutgoingMessage::text(chat_id, "❌ Could not load the order. Please try again.")];
            },
        };
        if !order.is_cash_on_delivery() {
            return vec![OutgoingMessage::text(chat_id, "❌ This order is not Cash on Delivery.")];
        }
        let qr_image_url = format!("{}/payment/qr/{n}", self.public_base_url);
        let confirmation_url = cod_confirmation_url(&self.public_base_url, n);
        vec![OutgoingMessage::text(chat_id, cod_qr_message(&order, &qr_image_url, &confirmation_url))]
    }

    /// Sends the replies. Failures are logged and otherwise ignored.
    pub async fn deliver(&self, reply: WebhookReply) {
        let Some(api) = &self.api else {
            debug!("🤖️ The bot is disabled. Dropping {} replies.", reply.messages.len());
            return;
        };
        for message in reply.messages {
            if let Err(e) = api.send_message(&message.chat_id, &message.text, message.keyboard.as_ref()).await {
                warn!("🤖️ Could not reply to chat {}. {e}", message.chat_id);
            }
        }
        if let Some((id, toast)) = reply.callback_answer {
            if let Err(e) = api.answer_callback_query(&id, toast.as_deref()).await {
                warn!("🤖️ Could not answer callback query {id}. {e}");
            }
        }
    }
}

fn order_message(chat_id: &str, order: &OrderSnapshot, include_items: bool) -> OutgoingMessage {
    OutgoingMessage::text(chat_id, format_order_message(order, include_items)).with_keyboard(order_keyboard(order))
}
