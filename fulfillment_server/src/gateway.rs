//! Client for the KHQR payment gateway.
//!
//! The gateway is consumed as an opaque HTTP service: it creates payment QR codes and reports whether a payment
//! (identified by the md5 of its QR payload) has completed. Every call runs under the configured timeout, and the
//! gateway's failures are mapped onto [`GatewayError`] so that the API layer can report them consistently.
use std::{fmt::Display, str::FromStr, sync::Arc};

use fulfillment_common::Money;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT},
    Client,
    StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{config::GatewayConfig, errors::ServerError};

pub const MIN_AMOUNT_USD: Money = Money::from_cents(10);
pub const MIN_AMOUNT_KHR: Money = Money::from_whole(400);
/// The gateway code for a payment it has not seen yet. This is the normal state of an unpaid QR code.
pub const MD5_NOT_FOUND: &str = "MD5_NOT_FOUND";
const CLIENT_USER_AGENT: &str = concat!("order-fulfillment/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Payment gateway did not respond in time")]
    Timeout,
    #[error("Could not reach payment gateway. {0}")]
    Connection(String),
    #[error("{0}")]
    Declined(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Invalid response from payment gateway. {0}")]
    InvalidResponse(String),
    #[error("Could not create the payment gateway client. {0}")]
    Initialization(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connection(e.to_string())
        } else {
            Self::InvalidResponse(e.to_string())
        }
    }
}

impl From<GatewayError> for ServerError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Timeout => Self::PaymentTimeout,
            GatewayError::Connection(s) => Self::PaymentConnectionError(s),
            GatewayError::Declined(s) => Self::PaymentDeclined(s),
            GatewayError::InvalidRequest(s) => Self::ValidationError(s),
            GatewayError::InvalidResponse(_) => Self::BackendError(e.to_string()),
            GatewayError::Initialization(s) => Self::InitializeError(s),
        }
    }
}

//--------------------------------------     KhqrCurrency      -------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KhqrCurrency {
    #[default]
    Usd,
    Khr,
}

impl KhqrCurrency {
    /// Unsupported or missing currencies fall back to USD.
    pub fn parse_or_default(s: Option<&str>) -> Self {
        s.and_then(|s| s.parse().ok()).unwrap_or_default()
    }

    pub fn minimum_amount(&self) -> Money {
        match self {
            Self::Usd => MIN_AMOUNT_USD,
            Self::Khr => MIN_AMOUNT_KHR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Khr => "KHR",
        }
    }
}

impl FromStr for KhqrCurrency {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "KHR" => Ok(Self::Khr),
            _ => Err(GatewayError::InvalidRequest(format!("Unsupported currency: {s}"))),
        }
    }
}

impl Display for KhqrCurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks a KHQR amount before anything is sent to the gateway.
pub fn validate_amount(amount: Money, currency: KhqrCurrency) -> Result<(), GatewayError> {
    if amount <= Money::default() {
        return Err(GatewayError::InvalidRequest("Amount must be greater than 0".to_string()));
    }
    let minimum = currency.minimum_amount();
    if amount < minimum {
        let message = match currency {
            KhqrCurrency::Usd => format!("Amount must be at least ${minimum} USD"),
            KhqrCurrency::Khr => format!("Amount must be at least {} KHR", minimum.value() / 100),
        };
        return Err(GatewayError::InvalidRequest(message));
    }
    Ok(())
}

pub fn validate_md5(md5: &str) -> Result<(), GatewayError> {
    match md5.trim().len() {
        0 => Err(GatewayError::InvalidRequest("MD5 hash is required".to_string())),
        32 => Ok(()),
        _ => Err(GatewayError::InvalidRequest("Invalid MD5 hash format (must be 32 characters)".to_string())),
    }
}

//--------------------------------------     PaymentStatus     -------------------------------------------------------
/// The outcome of a payment check. `data` is the gateway's own response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub paid: bool,
    pub pending: bool,
    pub message: String,
    pub data: Value,
}

impl PaymentStatus {
    pub fn pending<S: Into<String>>(message: S, data: Value) -> Self {
        Self { paid: false, pending: true, message: message.into(), data }
    }
}

//--------------------------------------     GatewayClient     -------------------------------------------------------
#[derive(Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> Result<String, GatewayError> {
        if self.config.url.is_empty() {
            return Err(GatewayError::Connection("The payment gateway URL is not configured".to_string()));
        }
        Ok(format!("{}{path}", self.config.url))
    }

    /// Asks the gateway for a new KHQR code. The gateway's response is returned as-is once it is known to carry both
    /// the QR payload and its md5.
    pub async fn create_khqr(&self, amount: Money, currency: KhqrCurrency) -> Result<Value, GatewayError> {
        validate_amount(amount, currency)?;
        let url = self.url("/api/khqr/create")?;
        let amount_str = amount.to_string();
        let merchant_id = self.config.merchant_id.reveal();
        let params = [
            ("amount", amount_str.as_str()),
            ("bakongid", merchant_id.as_str()),
            ("merchantname", self.config.merchant_name.as_str()),
            ("currency", currency.as_str()),
        ];
        debug!("🏦️ Requesting a KHQR code for {amount} {currency}");
        let response = self.client.get(url).query(&params).send().await?;
        let (status, data) = read_json(response).await?;
        interpret_create_response(status, data, amount)
    }

    /// Asks the gateway whether the payment identified by `md5` has completed.
    pub async fn check_payment(&self, md5: &str) -> Result<PaymentStatus, GatewayError> {
        validate_md5(md5)?;
        let url = self.url("/api/khqr/check")?;
        let merchant_id = self.config.merchant_id.reveal();
        let params = [("md5", md5.trim()), ("bakongid", merchant_id.as_str())];
        trace!("🏦️ Checking payment {md5}");
        let response = self.client.get(url).query(&params).send().await?;
        let (status, data) = read_json(response).await?;
        interpret_check_response(status, data)
    }

    /// Confirms that a gateway payment reference can be fetched before it is encoded into a QR code.
    pub async fn verify_reference_url(&self, url: &str) -> Result<(), GatewayError> {
        let url = url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(GatewayError::InvalidRequest(format!("{url} is not a valid payment reference URL")));
        }
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::OK => {
                trace!("🏦️ Payment reference {url} is reachable");
                Ok(())
            },
            status => {
                warn!("🏦️ Payment reference {url} could not be verified. Status {status}");
                Err(GatewayError::Declined(format!("The payment reference could not be verified (HTTP {status})")))
            },
        }
    }
}

/// Reads the body as JSON, even for error statuses. Bodies that are not JSON are wrapped in an error object.
async fn read_json(response: reqwest::Response) -> Result<(StatusCode, Value), GatewayError> {
    let status = response.status();
    let text = response.text().await?;
    let data = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| {
        let message = if text.is_empty() { format!("HTTP {status}") } else { text };
        json!({ "error": true, "message": message })
    });
    Ok((status, data))
}

fn message_or(data: &Value, default: &str) -> String {
    data.get("message").and_then(Value::as_str).unwrap_or(default).to_string()
}

fn is_error(data: &Value) -> bool {
    data.get("error").and_then(Value::as_bool).unwrap_or(false)
}

pub fn interpret_create_response(status: StatusCode, data: Value, amount: Money) -> Result<Value, GatewayError> {
    if status == StatusCode::FORBIDDEN {
        let message = message_or(&data, "Access forbidden. Check the merchant id and merchant name configuration.");
        error!("🏦️ The gateway refused to create a KHQR code. {message}");
        return Err(GatewayError::Declined(message));
    }
    if !status.is_success() {
        let message = message_or(&data, &format!("Payment gateway returned status {status}"));
        return Err(GatewayError::Declined(message));
    }
    if is_error(&data) {
        let message = message_or(&data, "Payment generation failed");
        let lower = message.to_lowercase();
        if lower.contains("invalid") && lower.contains("amount") {
            return Err(GatewayError::Declined(format!(
                "Amount is invalid. The gateway requires a minimum payment amount (typically $0.10 USD). Your \
                 amount: ${amount}"
            )));
        }
        return Err(GatewayError::Declined(message));
    }
    let has = |field: &str| data.get(field).and_then(Value::as_str).is_some_and(|s| !s.is_empty());
    if !has("qr") || !has("md5") {
        return Err(GatewayError::InvalidResponse("The response is missing the QR or MD5".to_string()));
    }
    Ok(data)
}

pub fn interpret_check_response(status: StatusCode, data: Value) -> Result<PaymentStatus, GatewayError> {
    if status == StatusCode::FORBIDDEN {
        return Err(GatewayError::Declined("Access forbidden. Check the merchant id configuration.".to_string()));
    }
    if !status.is_success() {
        let message = message_or(&data, &format!("Payment gateway returned status {status}"));
        return Err(GatewayError::Declined(message));
    }
    if is_error(&data) {
        let code = data.get("code").and_then(Value::as_str).unwrap_or("UNKNOWN_ERROR");
        if code == MD5_NOT_FOUND {
            return Ok(PaymentStatus::pending("Payment not found or not yet completed", data));
        }
        return Err(GatewayError::Declined(message_or(&data, "Payment check failed")));
    }
    let paid = data.get("responseCode").and_then(Value::as_i64) == Some(0);
    if paid {
        let message = message_or(&data, "Payment completed");
        Ok(PaymentStatus { paid: true, pending: false, message, data })
    } else {
        let message = message_or(&data, "Payment not yet completed");
        Ok(PaymentStatus::pending(message, data))
    }
}
