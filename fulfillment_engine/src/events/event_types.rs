use serde::{Deserialize, Serialize};

use crate::{db_types::OrderStatusType, order_objects::OrderSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderEvent {
    pub order: OrderSnapshot,
}

impl NewOrderEvent {
    pub fn new(order: OrderSnapshot) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub order: OrderSnapshot,
    pub old_status: OrderStatusType,
    pub new_status: OrderStatusType,
    pub changed_by: String,
}

impl StatusChangedEvent {
    pub fn new(order: OrderSnapshot, old_status: OrderStatusType, changed_by: &str) -> Self {
        let new_status = order.status;
        Self { order, old_status, new_status, changed_by: changed_by.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmedEvent {
    pub order: OrderSnapshot,
    pub confirmed_by: String,
}

impl PaymentConfirmedEvent {
    pub fn new(order: OrderSnapshot, confirmed_by: &str) -> Self {
        Self { order, confirmed_by: confirmed_by.to_string() }
    }
}

/// Every event the engine publishes, in the shape it is sent to real-time subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    NewOrder(NewOrderEvent),
    StatusChanged(StatusChangedEvent),
    PaymentConfirmed(PaymentConfirmedEvent),
}

impl OrderEvent {
    pub fn order(&self) -> &OrderSnapshot {
        match self {
            OrderEvent::NewOrder(e) => &e.order,
            OrderEvent::StatusChanged(e) => &e.order,
            OrderEvent::PaymentConfirmed(e) => &e.order,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::NewOrder(_) => "new_order",
            OrderEvent::StatusChanged(_) => "status_changed",
            OrderEvent::PaymentConfirmed(_) => "payment_confirmed",
        }
    }
}

impl From<NewOrderEvent> for OrderEvent {
    fn from(e: NewOrderEvent) -> Self {
        OrderEvent::NewOrder(e)
    }
}

impl From<StatusChangedEvent> for OrderEvent {
    fn from(e: StatusChangedEvent) -> Self {
        OrderEvent::StatusChanged(e)
    }
}

impl From<PaymentConfirmedEvent> for OrderEvent {
    fn from(e: PaymentConfirmedEvent) -> Self {
        OrderEvent::PaymentConfirmed(e)
    }
}
