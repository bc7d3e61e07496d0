//! Advisory fraud heuristics that run once, when an order is created.
//!
//! Each rule is evaluated independently against the new order and the customer's order history. Rules never block an
//! order; they only mark it as suspicious and record why, so that staff can verify it before dispatch.
use chrono::Duration;
use fulfillment_common::Money;

use crate::db_types::Order;

pub const DEFAULT_HIGH_VALUE_THRESHOLD: Money = Money::from_cents(100_000);
pub const DEFAULT_FIRST_ORDER_THRESHOLD: Money = Money::from_cents(10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyRules {
    /// Orders with a total above this value are flagged.
    pub high_value_threshold: Money,
    /// First orders from a new customer with a total above this value are flagged.
    pub first_order_threshold: Money,
    /// This many (or more) earlier orders from the same phone inside `burst_window` are flagged.
    pub burst_order_count: i64,
    pub burst_window: Duration,
}

impl Default for AnomalyRules {
    fn default() -> Self {
        Self {
            high_value_threshold: DEFAULT_HIGH_VALUE_THRESHOLD,
            first_order_threshold: DEFAULT_FIRST_ORDER_THRESHOLD,
            burst_order_count: 3,
            burst_window: Duration::hours(1),
        }
    }
}

/// What the order store knows about the customer, excluding the order being evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerHistory {
    /// Number of distinct customer names used on other orders with the same phone number
    pub distinct_names: i64,
    /// Other orders with the same phone number created inside the burst window
    pub recent_orders: i64,
    /// Other orders belonging to the same customer record
    pub prior_orders: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnomalyReport {
    pub reasons: Vec<String>,
}

impl AnomalyReport {
    pub fn is_suspicious(&self) -> bool {
        !self.reasons.is_empty()
    }

    /// All reasons in a single audit string, or `None` if nothing fired.
    pub fn reason(&self) -> Option<String> {
        self.is_suspicious().then(|| self.reasons.join("; "))
    }
}

impl AnomalyRules {
    pub fn evaluate(&self, order: &Order, history: &CustomerHistory) -> AnomalyReport {
        let mut reasons = Vec::new();
        if history.distinct_names > 1 {
            reasons.push(format!("Same phone used with {} different names", history.distinct_names));
        }
        if order.total > self.high_value_threshold {
            reasons.push(format!("High order value: ${}", order.total));
        }
        if history.recent_orders >= self.burst_order_count {
            reasons.push(format!("{} orders in last hour", history.recent_orders));
        }
        if history.prior_orders == 0 && order.total > self.first_order_threshold {
            reasons.push("First-time customer with large order".to_string());
        }
        AnomalyReport { reasons }
    }
}
