use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BotConfig;

#[derive(Debug, Clone, Error)]
pub enum BotApiError {
    #[error("Could not create the bot API client. {0}")]
    Initialization(String),
    #[error("The bot API did not respond in time")]
    Timeout,
    #[error("Could not send the request to the bot API. {0}")]
    Request(String),
    #[error("The bot API rejected the request ({status}). {message}")]
    Rejected { status: u16, message: String },
}

impl From<reqwest::Error> for BotApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            // Strip the URL, since it carries the bot token
            Self::Request(e.without_url().to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl InlineButton {
    pub fn callback<S: Into<String>>(text: S, data: S) -> Self {
        Self { text: text.into(), callback_data: Some(data.into()), url: None }
    }

    pub fn link<S: Into<String>>(text: S, url: S) -> Self {
        Self { text: text.into(), callback_data: None, url: Some(url.into()) }
    }
}

/// One button per row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn add_row(&mut self, button: InlineButton) {
        self.inline_keyboard.push(vec![button]);
    }

    pub fn is_empty(&self) -> bool {
        self.inline_keyboard.is_empty()
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.inline_keyboard.iter().flatten()
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboard>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Clone)]
pub struct BotApi {
    /// `{api_url}/bot{token}`. Never log this.
    base_url: String,
    client: Arc<Client>,
}

impl BotApi {
    pub fn new(config: &BotConfig) -> Result<Self, BotApiError> {
        if !config.is_enabled() {
            return Err(BotApiError::Initialization("No bot token has been configured".to_string()));
        }
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| BotApiError::Initialization(e.to_string()))?;
        let base_url = format!("{}/bot{}", config.api_url, config.token.reveal().trim());
        Ok(Self { base_url, client: Arc::new(client) })
    }

    async fn call<B: Serialize>(&self, method: &str, body: &B) -> Result<(), BotApiError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        let reply = response.json::<ApiResponse>().await.ok();
        match reply {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => {
                trace!("🤖️ {method} succeeded");
                Ok(())
            },
            other => {
                let message = other.and_then(|r| r.description).unwrap_or_else(|| "No description".to_string());
                Err(BotApiError::Rejected { status: status.as_u16(), message })
            },
        }
    }

    /// Posts an HTML-formatted message, with optional inline buttons.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), BotApiError> {
        let reply_markup = keyboard.filter(|k| !k.is_empty());
        let body = SendMessage { chat_id, text, parse_mode: Some("HTML"), reply_markup };
        self.call("sendMessage", &body).await
    }

    /// Posts a message without any markup.
    pub async fn send_plain_message(&self, chat_id: &str, text: &str) -> Result<(), BotApiError> {
        let body = SendMessage { chat_id, text, parse_mode: None, reply_markup: None };
        self.call("sendMessage", &body).await
    }

    /// Stops the spinner on a pressed button, optionally showing a short toast.
    pub async fn answer_callback_query(&self, callback_query_id: &str, text: Option<&str>) -> Result<(), BotApiError> {
        let body = AnswerCallbackQuery { callback_query_id, text };
        self.call("answerCallbackQuery", &body).await
    }
}

#[cfg(test)]
mod test {
    use fulfillment_common::Secret;

    use super::*;

    #[test]
    fn disabled_without_token() {
        let config = BotConfig::default();
        assert!(matches!(BotApi::new(&config), Err(BotApiError::Initialization(_))));
        let config = BotConfig { token: Secret::new("123:abc".to_string()), ..BotConfig::default() };
        let api = BotApi::new(&config).unwrap();
        assert_eq!(api.base_url, "https://api.telegram.org/bot123:abc");
    }

    #[test]
    fn keyboard_json() {
        let mut keyboard = InlineKeyboard::default();
        keyboard.add_row(InlineButton::callback("📦 Mark Ready", "status_MD00001_ready_for_delivery"));
        keyboard.add_row(InlineButton::link("QR", "https://shop.example/payment/qr/MD00001"));
        let json = serde_json::to_value(&keyboard).unwrap();
        assert_eq!(json["inline_keyboard"][0][0]["callback_data"], "status_MD00001_ready_for_delivery");
        assert!(json["inline_keyboard"][0][0].get("url").is_none());
        assert_eq!(json["inline_keyboard"][1][0]["url"], "https://shop.example/payment/qr/MD00001");
    }

    #[test]
    fn send_message_body() {
        let body = SendMessage { chat_id: "42", text: "<b>hi</b>", parse_mode: Some("HTML"), reply_markup: None };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "chat_id": "42", "text": "<b>hi</b>", "parse_mode": "HTML" }));
    }
}
