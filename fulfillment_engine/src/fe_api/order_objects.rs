use std::fmt::Display;

use chrono::{DateTime, Utc};
use fulfillment_common::Money;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Order, OrderItem, OrderNumber, OrderStatusType, PaymentMethod, VerificationStatus},
    traits::OrderQueryError,
};

/// The most orders a single search returns, regardless of the requested limit.
pub const MAX_SEARCH_RESULTS: i64 = 500;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub order_number: Option<OrderNumber>,
    /// Matched against the normalized (digits-only) phone number
    pub phone: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
    pub suspicious: Option<bool>,
    pub limit: Option<i64>,
}

impl OrderQueryFilter {
    pub fn with_order_number(mut self, order_number: OrderNumber) -> Self {
        self.order_number = Some(order_number);
        self
    }

    pub fn with_phone<S: AsRef<str>>(mut self, phone: S) -> Self {
        self.phone = Some(fulfillment_common::helpers::normalize_phone(phone.as_ref()));
        self
    }

    pub fn since<T>(mut self, since: T) -> Result<Self, OrderQueryError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = since.try_into().map_err(|e| OrderQueryError::QueryError(e.to_string()))?;
        self.since = Some(dt);
        Ok(self)
    }

    pub fn until<T>(mut self, until: T) -> Result<Self, OrderQueryError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = until.try_into().map_err(|e| OrderQueryError::QueryError(e.to_string()))?;
        self.until = Some(dt);
        Ok(self)
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn only_suspicious(mut self) -> Self {
        self.suspicious = Some(true);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The row limit to apply, clamped to `1..=MAX_SEARCH_RESULTS`.
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(MAX_SEARCH_RESULTS).clamp(1, MAX_SEARCH_RESULTS)
    }

    pub fn is_empty(&self) -> bool {
        self.order_number.is_none() &&
            self.phone.is_none() &&
            self.since.is_none() &&
            self.until.is_none() &&
            self.status.as_ref().map_or(true, Vec::is_empty) &&
            self.suspicious.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(order_number) = &self.order_number {
            write!(f, "order_number: {order_number}. ")?;
        }
        if let Some(phone) = &self.phone {
            write!(f, "phone: {phone}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        if let Some(suspicious) = self.suspicious {
            write!(f, "suspicious: {suspicious}. ")?;
        }
        Ok(())
    }
}

//--------------------------------------     OrderSnapshot     -------------------------------------------------------
/// The normalized view of an order that is sent to dashboards, the messaging bot and API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_number: OrderNumber,
    pub status: OrderStatusType,
    pub status_display: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub customer_province: String,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub payment_received: bool,
    pub payment_received_by: Option<String>,
    pub customer_received: bool,
    pub verification_status: VerificationStatus,
    pub is_suspicious: bool,
    pub suspicious_reason: Option<String>,
    pub items: Vec<OrderItemSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemSnapshot {
    pub product_id: String,
    pub name: String,
    pub price: Money,
    pub quantity: i64,
    pub subtotal: Money,
}

impl From<&OrderItem> for OrderItemSnapshot {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            name: item.product_name.clone(),
            price: item.product_price,
            quantity: item.quantity,
            subtotal: item.subtotal,
        }
    }
}

impl OrderSnapshot {
    pub fn new(order: Order, items: &[OrderItem]) -> Self {
        Self {
            status_display: order.status.display_name().to_string(),
            order_number: order.order_number,
            status: order.status,
            customer_name: order.customer_name,
            customer_phone: order.customer_phone,
            customer_address: order.customer_address,
            customer_province: order.customer_province,
            subtotal: order.subtotal,
            discount: order.discount,
            shipping: order.shipping,
            total: order.total,
            payment_method: order.payment_method,
            payment_received: order.payment_received,
            payment_received_by: order.payment_received_by,
            customer_received: order.customer_received,
            verification_status: order.verification_status,
            is_suspicious: order.is_suspicious,
            suspicious_reason: order.suspicious_reason,
            items: items.iter().map(OrderItemSnapshot::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }

    pub fn is_cash_on_delivery(&self) -> bool {
        !self.payment_method.is_prepaid()
    }

    pub fn item_count(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}
