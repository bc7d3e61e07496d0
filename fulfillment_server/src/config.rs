use std::{env, fmt::Display, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use fulfillment_common::{helpers::parse_boolean_flag, Secret};
use fulfillment_engine::helpers::{AnomalyRules, DEFAULT_FIRST_ORDER_THRESHOLD, DEFAULT_HIGH_VALUE_THRESHOLD};
use log::*;

const DEFAULT_OFP_HOST: &str = "127.0.0.1";
const DEFAULT_OFP_PORT: u16 = 8360;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:8360";
const DEFAULT_MAX_WS_CONNECTIONS: i64 = 100;
const DEFAULT_BOT_API_URL: &str = "https://api.telegram.org";
const DEFAULT_BOT_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const DEFAULT_GATEWAY_TIMEOUT: StdDuration = StdDuration::from_secs(15);
const DEFAULT_QR_RETENTION_DAYS: i64 = 7;
const DEFAULT_QR_CLEANUP_INTERVAL: StdDuration = StdDuration::from_secs(3600);
const MIN_QR_CLEANUP_INTERVAL: StdDuration = StdDuration::from_secs(1);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The externally visible URL of this server. Used to build the COD confirmation links that end up in QR codes.
    pub public_base_url: String,
    /// When true, error responses include the internal error detail. Never enable this in production.
    pub debug_errors: bool,
    /// The most websocket subscribers the `orders_updates` group admits at once.
    pub max_ws_connections: i64,
    pub anomaly_rules: AnomalyRules,
    pub bot: BotConfig,
    pub gateway: GatewayConfig,
    /// QR artifacts are deleted once they have been expired for this long.
    pub qr_retention: Duration,
    pub qr_cleanup_interval: StdDuration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OFP_HOST.to_string(),
            port: DEFAULT_OFP_PORT,
            database_url: String::default(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            debug_errors: false,
            max_ws_connections: DEFAULT_MAX_WS_CONNECTIONS,
            anomaly_rules: AnomalyRules::default(),
            bot: BotConfig::default(),
            gateway: GatewayConfig::default(),
            qr_retention: Duration::days(DEFAULT_QR_RETENTION_DAYS),
            qr_cleanup_interval: DEFAULT_QR_CLEANUP_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("OFP_HOST").ok().unwrap_or_else(|| DEFAULT_OFP_HOST.into());
        let port = parse_env("OFP_PORT", DEFAULT_OFP_PORT);
        let database_url = env::var("OFP_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ OFP_DATABASE_URL is not set. Please set it to the URL for the order database.");
            String::default()
        });
        let public_base_url = env::var("OFP_PUBLIC_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| {
                info!("🪛️ OFP_PUBLIC_BASE_URL is not set. Using {DEFAULT_PUBLIC_BASE_URL} for confirmation links.");
                DEFAULT_PUBLIC_BASE_URL.to_string()
            });
        let debug_errors = parse_boolean_flag(env::var("OFP_DEBUG_ERRORS").ok(), false);
        if debug_errors {
            warn!("🪛️ OFP_DEBUG_ERRORS is on. Error responses will include internal details.");
        }
        let max_ws_connections = parse_env("OFP_MAX_WS_CONNECTIONS", DEFAULT_MAX_WS_CONNECTIONS);
        let anomaly_rules = AnomalyRules {
            high_value_threshold: parse_env("OFP_HIGH_VALUE_THRESHOLD", DEFAULT_HIGH_VALUE_THRESHOLD),
            first_order_threshold: parse_env("OFP_FIRST_ORDER_THRESHOLD", DEFAULT_FIRST_ORDER_THRESHOLD),
            ..AnomalyRules::default()
        };
        let qr_retention = Duration::days(parse_env("OFP_QR_RETENTION_DAYS", DEFAULT_QR_RETENTION_DAYS));
        let qr_cleanup_interval = at_least(
            "OFP_QR_CLEANUP_INTERVAL",
            parse_secs("OFP_QR_CLEANUP_INTERVAL", DEFAULT_QR_CLEANUP_INTERVAL),
            MIN_QR_CLEANUP_INTERVAL,
        );
        Self {
            host,
            port,
            database_url,
            public_base_url,
            debug_errors,
            max_ws_connections,
            anomaly_rules,
            bot: BotConfig::from_env_or_defaults(),
            gateway: GatewayConfig::from_env_or_defaults(),
            qr_retention,
            qr_cleanup_interval,
        }
    }

    pub fn public_url(&self) -> PublicUrl {
        PublicUrl::new(&self.public_base_url)
    }
}

/// The externally visible base URL, shared with the route handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicUrl(String);

impl PublicUrl {
    pub fn new<S: AsRef<str>>(url: S) -> Self {
        Self(url.as_ref().trim_end_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Messaging bot settings. The bot is disabled when no token is configured.
#[derive(Clone, Debug)]
pub struct BotConfig {
    pub token: Secret<String>,
    /// Chats that receive order notifications
    pub chat_ids: Vec<String>,
    pub api_url: String,
    pub timeout: StdDuration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: Secret::default(),
            chat_ids: Vec::new(),
            api_url: DEFAULT_BOT_API_URL.to_string(),
            timeout: DEFAULT_BOT_TIMEOUT,
        }
    }
}

impl BotConfig {
    pub fn from_env_or_defaults() -> Self {
        let token = Secret::new(env::var("OFP_BOT_TOKEN").unwrap_or_default());
        let chat_ids = env::var("OFP_BOT_CHAT_IDS")
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect::<Vec<_>>())
            .unwrap_or_default();
        let api_url = env::var("OFP_BOT_API_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_BOT_API_URL.to_string());
        let timeout = parse_secs("OFP_BOT_TIMEOUT", DEFAULT_BOT_TIMEOUT);
        let result = Self { token, chat_ids, api_url, timeout };
        match (result.is_enabled(), result.chat_ids.is_empty()) {
            (false, _) => info!("🪛️ OFP_BOT_TOKEN is not set. Bot notifications are disabled."),
            (true, true) => warn!("🪛️ The bot is configured, but OFP_BOT_CHAT_IDS is empty. No one will be notified."),
            (true, false) => info!("🪛️ Bot notifications go to {} chat(s)", result.chat_ids.len()),
        }
        result
    }

    pub fn is_enabled(&self) -> bool {
        !self.token.is_empty()
    }
}

/// Payment gateway (KHQR) settings.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub url: String,
    pub merchant_id: Secret<String>,
    pub merchant_name: String,
    pub timeout: StdDuration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: String::default(),
            merchant_id: Secret::default(),
            merchant_name: String::default(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    pub fn from_env_or_defaults() -> Self {
        let url = env::var("OFP_GATEWAY_URL").map(|s| s.trim_end_matches('/').to_string()).unwrap_or_else(|_| {
            warn!("🪛️ OFP_GATEWAY_URL is not set. KHQR payments will not work.");
            String::default()
        });
        let merchant_id = Secret::new(env::var("OFP_GATEWAY_MERCHANT_ID").unwrap_or_default());
        let merchant_name = env::var("OFP_GATEWAY_MERCHANT_NAME").unwrap_or_default();
        let timeout = parse_secs("OFP_GATEWAY_TIMEOUT", DEFAULT_GATEWAY_TIMEOUT);
        Self { url, merchant_id, merchant_name, timeout }
    }
}

fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

fn parse_secs(name: &str, default: StdDuration) -> StdDuration {
    StdDuration::from_secs(parse_env(name, default.as_secs()))
}

fn at_least(name: &str, value: StdDuration, min: StdDuration) -> StdDuration {
    if value < min {
        warn!("🪛️ {name} must be at least {}s. Using {}s instead.", min.as_secs(), min.as_secs());
        min
    } else {
        value
    }
}
