use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType};

/// The result of a successful status update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub old_status: OrderStatusType,
    pub order: Order,
    /// True if entering `delivered` also set the customer-received flag
    pub auto_received: bool,
}

impl StatusChange {
    pub fn new_status(&self) -> OrderStatusType {
        self.order.status
    }
}

/// The result of a cash-on-delivery confirmation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodConfirmation {
    pub order: Order,
    /// The payment had been recorded before this request. Nothing was changed.
    pub already_confirmed: bool,
    /// Set when the confirmation moved the order out of `pending`
    pub previous_status: Option<OrderStatusType>,
}

impl CodConfirmation {
    pub fn status_changed(&self) -> bool {
        self.previous_status.is_some_and(|s| s != self.order.status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerReceipt {
    pub order: Order,
    pub already_received: bool,
}
