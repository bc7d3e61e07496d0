use std::str::FromStr;

use chrono::{DateTime, Utc};
use fulfillment_common::Money;
use fulfillment_engine::{
    db_types::{CartLine, NewOrder, OrderNumber, OrderStatusType, PaymentMethod},
    order_objects::{OrderQueryFilter, OrderSnapshot},
};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

/// The actor recorded for COD confirmations that don't name a driver.
pub const DEFAULT_DRIVER_ACTOR: &str = "Driver";
/// The actor recorded for staff API calls that don't name anyone.
pub const DEFAULT_API_ACTOR: &str = "API";

fn actor_or(actor: Option<&str>, default: &str) -> String {
    actor.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(default).to_string()
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

pub fn parse_order_number(s: &str) -> Result<OrderNumber, ServerError> {
    OrderNumber::from_str(s).map_err(|e| ServerError::ValidationError(e.to_string()))
}

//--------------------------------------     Order intake      -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub name: String,
    pub price: Money,
    pub qty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub province: String,
    pub payment_method: String,
    pub subtotal: Money,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub shipping: Money,
    pub total: Money,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

impl TryFrom<CreateOrderRequest> for NewOrder {
    type Error = ServerError;

    fn try_from(req: CreateOrderRequest) -> Result<Self, Self::Error> {
        let method = PaymentMethod::from_str(&req.payment_method)
            .map_err(|e| ServerError::ValidationError(format!("payment_method: {e}")))?;
        let items = req.items.into_iter().map(|item| CartLine::new(item.id, item.name, item.price, item.qty)).collect();
        // The client's figures are kept as sent, so that validation can check them
        Ok(NewOrder {
            name: req.name,
            phone: req.phone,
            address: req.address,
            province: req.province,
            payment_method: method,
            subtotal: req.subtotal,
            discount: req.discount,
            shipping: req.shipping,
            total: req.total,
            items,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order_number: OrderNumber,
    pub message: String,
}

impl CreateOrderResponse {
    pub fn new(order_number: OrderNumber) -> Self {
        Self { success: true, order_number, message: "Order created successfully".to_string() }
    }
}

//--------------------------------------   Status & receipt    -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    #[serde(default)]
    pub actor: Option<String>,
}

impl StatusUpdateRequest {
    pub fn status(&self) -> Result<OrderStatusType, ServerError> {
        OrderStatusType::from_str(&self.status).map_err(|e| ServerError::ValidationError(e.to_string()))
    }

    pub fn actor(&self) -> String {
        actor_or(self.actor.as_deref(), DEFAULT_API_ACTOR)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateResponse {
    pub success: bool,
    pub message: String,
    pub order: OrderSnapshot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceivedRequest {
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReceivedRequest {
    pub fn actor(&self) -> String {
        actor_or(self.actor.as_deref(), DEFAULT_API_ACTOR)
    }

    pub fn notes(&self) -> Option<&str> {
        non_empty(self.notes.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedResponse {
    pub success: bool,
    pub message: String,
    pub already_received: bool,
}

//--------------------------------------       Payments        -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodConfirmRequest {
    pub order_number: String,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CodConfirmRequest {
    pub fn actor(&self) -> String {
        actor_or(self.driver_name.as_deref(), DEFAULT_DRIVER_ACTOR)
    }

    pub fn notes(&self) -> Option<&str> {
        non_empty(self.notes.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodConfirmResponse {
    pub success: bool,
    pub message: String,
    pub already_confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrIssueRequest {
    pub order_number: String,
    pub qr_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrIssueResponse {
    pub success: bool,
    pub message: String,
    pub expires_at: DateTime<Utc>,
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KhqrCreateParams {
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl KhqrCreateParams {
    pub fn amount(&self) -> Result<Money, ServerError> {
        let amount = self.amount.as_deref().unwrap_or("0");
        Money::from_str(amount).map_err(|_| ServerError::ValidationError("Invalid amount format".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KhqrCheckParams {
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub order_number: Option<String>,
}

//--------------------------------------        Search         -------------------------------------------------------
/// Query string for `GET /orders`. `status` takes a comma-separated list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderSearchParams {
    pub order_number: Option<String>,
    pub phone: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub suspicious: Option<bool>,
    pub limit: Option<i64>,
}

impl TryFrom<OrderSearchParams> for OrderQueryFilter {
    type Error = ServerError;

    fn try_from(params: OrderSearchParams) -> Result<Self, Self::Error> {
        let mut filter = OrderQueryFilter { since: params.since, until: params.until, ..Default::default() };
        if let Some(n) = non_empty(params.order_number.as_deref()) {
            filter = filter.with_order_number(parse_order_number(n)?);
        }
        if let Some(phone) = non_empty(params.phone.as_deref()) {
            filter = filter.with_phone(phone);
        }
        if let Some(statuses) = non_empty(params.status.as_deref()) {
            for s in statuses.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let status =
                    OrderStatusType::from_str(s).map_err(|e| ServerError::ValidationError(e.to_string()))?;
                filter = filter.with_status(status);
            }
        }
        if params.suspicious == Some(true) {
            filter = filter.only_suspicious();
        }
        if let Some(limit) = params.limit {
            filter = filter.with_limit(limit);
        }
        Ok(filter)
    }
}
