use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use fulfillment_common::{helpers::normalize_phone, Money};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

/// Every order number starts with this prefix, followed by a zero-padded sequence number.
pub const ORDER_NUMBER_PREFIX: &str = "MD";
/// How long an issued payment QR code remains valid.
pub const QR_CODE_VALIDITY: Duration = Duration::minutes(10);
/// The actor recorded when an order reaches `delivered` without an explicit customer-received confirmation.
pub const AUTO_RECEIVED_ACTOR: &str = "system-auto";

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------      OrderNumber      -------------------------------------------------------
/// The human-facing order identifier, e.g. `MD00042`. This is distinct from the internal row id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderNumber(pub String);

impl OrderNumber {
    pub fn from_sequence(seq: i64) -> Self {
        Self(format!("{ORDER_NUMBER_PREFIX}{seq:05}"))
    }

    /// The numeric part of the order number, if it has one.
    pub fn sequence(&self) -> Option<i64> {
        let digits = self.0.trim_start_matches('#').strip_prefix(ORDER_NUMBER_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Returns the order number that follows the highest sequence number allocated so far.
    pub fn next_after(highest: Option<i64>) -> Self {
        Self::from_sequence(highest.unwrap_or(0) + 1)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderNumber {
    type Err = ConversionError;

    /// Order numbers typed by people are forgiving: `" md00001 "` and `"#MD00001"` both parse to `MD00001`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('#').to_uppercase();
        if s.is_empty() {
            return Err(ConversionError("Order number is required".to_string()));
        }
        Ok(Self(s))
    }
}

impl From<&str> for OrderNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// Cash-on-delivery order that has not been confirmed yet
    Pending,
    /// Payment has been verified (pre-paid) or collected (COD)
    Confirmed,
    Preparing,
    ReadyForDelivery,
    OutForDelivery,
    Delivered,
    Cancelled,
}

use OrderStatusType::*;

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 7] =
        [Pending, Confirmed, Preparing, ReadyForDelivery, OutForDelivery, Delivered, Cancelled];

    pub fn allowed_transitions(&self) -> &'static [OrderStatusType] {
        match self {
            Pending => &[Confirmed, Preparing, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[ReadyForDelivery, Cancelled],
            ReadyForDelivery => &[OutForDelivery, Cancelled],
            OutForDelivery => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn validate_transition(&self, next: OrderStatusType) -> Result<(), TransitionError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TransitionError { from: *self, to: next, allowed: self.allowed_transitions().to_vec() })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pending => "pending",
            Confirmed => "confirmed",
            Preparing => "preparing",
            ReadyForDelivery => "ready_for_delivery",
            OutForDelivery => "out_for_delivery",
            Delivered => "delivered",
            Cancelled => "cancelled",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Pending => "Pending",
            Confirmed => "Confirmed",
            Preparing => "Preparing",
            ReadyForDelivery => "Ready for Delivery",
            OutForDelivery => "Out for Delivery",
            Delivered => "Delivered",
            Cancelled => "Cancelled",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|status| status.as_str() == s.trim())
            .copied()
            .ok_or_else(|| ConversionError(format!("Invalid order status: {s}")))
    }
}

/// A status change that the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid status transition: Cannot change from \"{from}\" to \"{to}\". Allowed transitions: {}", allowed_list(.allowed))]
pub struct TransitionError {
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub allowed: Vec<OrderStatusType>,
}

fn allowed_list(allowed: &[OrderStatusType]) -> String {
    if allowed.is_empty() {
        "None (final state)".to_string()
    } else {
        allowed.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
    }
}

//--------------------------------------     PaymentMethod     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[sqlx(rename = "KHQR")]
    #[serde(rename = "KHQR")]
    Khqr,
    #[sqlx(rename = "ACLEDA Bank")]
    #[serde(rename = "ACLEDA Bank")]
    AcledaBank,
    #[sqlx(rename = "Wing Money")]
    #[serde(rename = "Wing Money")]
    WingMoney,
    #[sqlx(rename = "Cash on Delivery")]
    #[serde(rename = "Cash on Delivery")]
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Khqr => "KHQR",
            Self::AcledaBank => "ACLEDA Bank",
            Self::WingMoney => "Wing Money",
            Self::CashOnDelivery => "Cash on Delivery",
        }
    }

    /// Pre-paid methods have been verified by the payment gateway before the order is submitted.
    pub fn is_prepaid(&self) -> bool {
        !matches!(self, Self::CashOnDelivery)
    }

    pub fn initial_status(&self) -> OrderStatusType {
        if self.is_prepaid() {
            Confirmed
        } else {
            Pending
        }
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "khqr" => Ok(Self::Khqr),
            "acleda bank" => Ok(Self::AcledaBank),
            "wing money" => Ok(Self::WingMoney),
            "cash on delivery" | "cod" => Ok(Self::CashOnDelivery),
            _ => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

//--------------------------------------  VerificationStatus   -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, Default)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
    Suspicious,
    Rejected,
}

//--------------------------------------        Product        -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Administrative restocking record. Inserts the product, or overwrites the existing one with the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub id: String,
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub is_active: bool,
}

impl NewProduct {
    pub fn new<S: Into<String>>(id: S, name: S, price: Money, stock: i64) -> Self {
        Self { id: id.into(), name: name.into(), price, stock, is_active: true }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

//--------------------------------------        Customer       -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    /// Digits only
    pub phone: String,
    pub address: String,
    pub province: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------         Order         -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub order_number: OrderNumber,
    pub customer_id: Option<i64>,
    // Customer snapshot at the time of the order
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub customer_province: String,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub status: OrderStatusType,
    // Cash-on-delivery payment tracking
    pub payment_received: bool,
    pub payment_received_at: Option<DateTime<Utc>>,
    pub payment_received_by: Option<String>,
    pub cod_notes: Option<String>,
    // Verification
    pub is_verified: bool,
    pub verification_status: VerificationStatus,
    pub is_suspicious: bool,
    pub suspicious_reason: Option<String>,
    // Physical handover, independent of payment
    pub customer_received: bool,
    pub customer_received_at: Option<DateTime<Utc>>,
    pub customer_received_by: Option<String>,
    pub customer_received_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_cash_on_delivery(&self) -> bool {
        !self.payment_method.is_prepaid()
    }
}

//--------------------------------------       OrderItem       -------------------------------------------------------
/// A line item. Name and price are snapshots taken when the order was placed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: String,
    pub product_name: String,
    pub product_price: Money,
    pub quantity: i64,
    pub subtotal: Money,
}

//--------------------------------------       CartLine        -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    pub price: Money,
    pub quantity: i64,
}

impl CartLine {
    pub fn new<S: Into<String>>(product_id: S, name: S, price: Money, quantity: i64) -> Self {
        Self { product_id: product_id.into(), name: name.into(), price, quantity }
    }

    /// Saturates on overflow. Validation rejects such lines.
    pub fn subtotal(&self) -> Money {
        self.checked_subtotal().unwrap_or(Money::MAX)
    }

    /// `None` if price × quantity does not fit in a currency amount
    pub fn checked_subtotal(&self) -> Option<Money> {
        self.price.checked_mul(self.quantity)
    }
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub province: String,
    pub payment_method: PaymentMethod,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub total: Money,
    pub items: Vec<CartLine>,
}

impl NewOrder {
    /// Creates a new order with no discount or shipping, where the subtotal and total are derived from the cart.
    pub fn new<S: Into<String>>(name: S, phone: S, address: S, province: S, method: PaymentMethod) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            address: address.into(),
            province: province.into(),
            payment_method: method,
            subtotal: Money::default(),
            discount: Money::default(),
            shipping: Money::default(),
            total: Money::default(),
            items: Vec::new(),
        }
    }

    /// Adds a line to the cart and recalculates the subtotal and total.
    pub fn with_item(mut self, line: CartLine) -> Self {
        self.items.push(line);
        self.subtotal =
            self.items.iter().try_fold(Money::default(), |acc, l| acc.checked_add(l.subtotal())).unwrap_or(Money::MAX);
        self.recalculate_total()
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self.recalculate_total()
    }

    pub fn with_shipping(mut self, shipping: Money) -> Self {
        self.shipping = shipping;
        self.recalculate_total()
    }

    fn recalculate_total(mut self) -> Self {
        self.total =
            self.subtotal.checked_sub(self.discount).and_then(|m| m.checked_add(self.shipping)).unwrap_or(Money::MAX);
        self
    }

    pub fn normalized_phone(&self) -> String {
        normalize_phone(&self.phone)
    }

    /// Checks the contact fields, cart lines and pricing breakdown. The first problem found is returned.
    pub fn validate(&self) -> Result<(), String> {
        let required =
            [("name", &self.name), ("phone", &self.phone), ("address", &self.address), ("province", &self.province)];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(format!("Missing required field: {field}"));
        }
        if self.normalized_phone().is_empty() {
            return Err("Invalid phone number format".to_string());
        }
        if self.items.is_empty() {
            return Err("Cart is empty".to_string());
        }
        for line in &self.items {
            if line.product_id.trim().is_empty() {
                return Err("Every cart item needs a product id".to_string());
            }
            if line.quantity < 1 {
                return Err(format!("Quantity for {} must be at least 1", line.product_id));
            }
            if line.price.is_negative() {
                return Err(format!("Price for {} cannot be negative", line.product_id));
            }
            if line.checked_subtotal().is_none() {
                return Err(format!("Price or quantity for {} is too large", line.product_id));
            }
        }
        if self.items.iter().try_fold(0i64, |acc, line| acc.checked_add(line.quantity)).is_none() {
            return Err("items: the total quantity is too large".to_string());
        }
        if self.discount.is_negative() || self.shipping.is_negative() {
            return Err("Discount and shipping cannot be negative".to_string());
        }
        let items_total = self
            .items
            .iter()
            .try_fold(Money::default(), |acc, line| acc.checked_add(line.subtotal()))
            .ok_or_else(|| "subtotal: the cart total is too large".to_string())?;
        if items_total != self.subtotal {
            return Err(format!("Subtotal {} does not match the cart total of {items_total}", self.subtotal));
        }
        let expected = self
            .subtotal
            .checked_sub(self.discount)
            .and_then(|m| m.checked_add(self.shipping))
            .ok_or_else(|| "total: the order total is too large".to_string())?;
        if expected != self.total || self.total.is_negative() {
            return Err(format!(
                "Total {} does not equal subtotal - discount + shipping ({expected})",
                self.total
            ));
        }
        Ok(())
    }

    /// The quantity requested per product, with repeated lines for the same product merged. The map is keyed by
    /// product id, so iteration order is the lock acquisition order.
    pub fn reservations(&self) -> BTreeMap<String, StockReservation> {
        let mut result = BTreeMap::<String, StockReservation>::new();
        for line in &self.items {
            result
                .entry(line.product_id.clone())
                .and_modify(|r| r.quantity = r.quantity.saturating_add(line.quantity))
                .or_insert_with(|| StockReservation { name: line.name.clone(), quantity: line.quantity });
        }
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockReservation {
    pub name: String,
    pub quantity: i64,
}

//--------------------------------------    StockShortfall     -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub id: String,
    pub name: String,
    pub available: i64,
    pub requested: i64,
}

//--------------------------------------      OrderQrCode      -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderQrCode {
    pub id: i64,
    pub order_id: i64,
    /// The payment reference encoded in the image
    pub qr_data: String,
    /// PNG bytes
    #[serde(skip)]
    pub image: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl OrderQrCode {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at && !self.is_used
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_numbers() {
        assert_eq!(OrderNumber::next_after(None).as_str(), "MD00001");
        assert_eq!(OrderNumber::next_after(Some(41)).as_str(), "MD00042");
        assert_eq!(OrderNumber::from_sequence(123456).as_str(), "MD123456");
        assert_eq!(OrderNumber::from("MD00042").sequence(), Some(42));
        assert_eq!(OrderNumber::from("#MD00007").sequence(), Some(7));
        assert_eq!(OrderNumber::from("MDX0001").sequence(), None);
        assert_eq!(OrderNumber::from("ORD-1").sequence(), None);
        assert_eq!(" md00003 ".parse::<OrderNumber>().unwrap().as_str(), "MD00003");
        assert!("  ".parse::<OrderNumber>().is_err());
    }

    #[test]
    fn full_lifecycle_is_allowed() {
        let path = [Pending, Confirmed, Preparing, ReadyForDelivery, OutForDelivery, Delivered];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(Delivered.is_terminal());
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn every_live_state_can_be_cancelled() {
        for status in OrderStatusType::ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(status.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn skipping_states_is_rejected() {
        let err = Pending.validate_transition(OutForDelivery).unwrap_err();
        assert_eq!(err.from, Pending);
        assert_eq!(err.to, OutForDelivery);
        assert_eq!(err.allowed, vec![Confirmed, Preparing, Cancelled]);
        assert_eq!(
            err.to_string(),
            "Invalid status transition: Cannot change from \"pending\" to \"out_for_delivery\". Allowed transitions: \
             confirmed, preparing, cancelled"
        );
        let err = Delivered.validate_transition(Cancelled).unwrap_err();
        assert!(err.to_string().ends_with("None (final state)"));
        assert!(Confirmed.validate_transition(Pending).is_err());
        assert!(Preparing.validate_transition(Preparing).is_err());
    }

    #[test]
    fn status_strings() {
        for status in OrderStatusType::ALL {
            assert_eq!(status.as_str().parse::<OrderStatusType>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatusType>().is_err());
        assert_eq!(serde_json::to_string(&ReadyForDelivery).unwrap(), "\"ready_for_delivery\"");
    }

    #[test]
    fn initial_status_depends_on_payment_method() {
        assert_eq!(PaymentMethod::CashOnDelivery.initial_status(), Pending);
        assert_eq!(PaymentMethod::Khqr.initial_status(), Confirmed);
        assert_eq!(PaymentMethod::AcledaBank.initial_status(), Confirmed);
        assert_eq!(PaymentMethod::WingMoney.initial_status(), Confirmed);
        assert_eq!("Cash on Delivery".parse::<PaymentMethod>().unwrap(), PaymentMethod::CashOnDelivery);
        let method: PaymentMethod = serde_json::from_str("\"Wing Money\"").unwrap();
        assert_eq!(method, PaymentMethod::WingMoney);
    }

    fn lipstick_order() -> NewOrder {
        NewOrder::new("Dara", "012 345 678", "St 271", "Phnom Penh", PaymentMethod::CashOnDelivery)
            .with_item(CartLine::new("P1", "Lipstick", Money::from(1999), 2))
    }

    #[test]
    fn valid_order() {
        let order = lipstick_order();
        assert_eq!(order.total, Money::from(3998));
        assert!(order.validate().is_ok());
        assert_eq!(order.normalized_phone(), "012345678");
    }

    #[test]
    fn invalid_orders() {
        let mut order = lipstick_order();
        order.address = "   ".into();
        assert_eq!(order.validate().unwrap_err(), "Missing required field: address");

        let mut order = lipstick_order();
        order.total = Money::from(100);
        assert!(order.validate().unwrap_err().starts_with("Total 1.00"));

        let mut order = lipstick_order();
        order.items[0].quantity = 0;
        assert!(order.validate().is_err());

        let mut order = lipstick_order();
        order.items.clear();
        assert_eq!(order.validate().unwrap_err(), "Cart is empty");

        let mut order = lipstick_order();
        order.phone = "n/a".into();
        assert_eq!(order.validate().unwrap_err(), "Invalid phone number format");
    }

    #[test]
    fn oversized_carts_are_rejected() {
        let mut order = lipstick_order();
        order.items[0].price = "46116860184273879.04".parse().unwrap();
        order.items[0].quantity = 4;
        assert_eq!(order.validate().unwrap_err(), "Price or quantity for P1 is too large");

        let mut order = lipstick_order();
        order.items[0].quantity = i64::MAX / 1000;
        assert_eq!(order.validate().unwrap_err(), "Price or quantity for P1 is too large");

        // Each line fits, but the cart does not
        let mut order = lipstick_order();
        order.items[0].price = Money::from(i64::MAX / 2);
        order.items[0].quantity = 1;
        order.items.push(order.items[0].clone());
        order.items.push(order.items[0].clone());
        assert_eq!(order.validate().unwrap_err(), "subtotal: the cart total is too large");

        let mut order = lipstick_order();
        order.items[0].price = Money::default();
        order.items[0].quantity = i64::MAX;
        order.items.push(order.items[0].clone());
        assert_eq!(order.validate().unwrap_err(), "items: the total quantity is too large");
        assert_eq!(order.reservations()["P1"].quantity, i64::MAX);

        let mut order = lipstick_order();
        order.shipping = Money::from(i64::MAX);
        assert_eq!(order.validate().unwrap_err(), "total: the order total is too large");
    }

    #[test]
    fn discount_and_shipping() {
        let order = lipstick_order().with_discount(Money::from(500)).with_shipping(Money::from(150));
        assert_eq!(order.total, Money::from(3998 - 500 + 150));
        assert!(order.validate().is_ok());
    }

    #[test]
    fn reservations_are_merged_and_sorted() {
        let order = lipstick_order()
            .with_item(CartLine::new("A9", "Mascara", Money::from(500), 1))
            .with_item(CartLine::new("P1", "Lipstick", Money::from(1999), 3));
        let reservations = order.reservations();
        let ids = reservations.keys().cloned().collect::<Vec<_>>();
        assert_eq!(ids, vec!["A9".to_string(), "P1".to_string()]);
        assert_eq!(reservations["P1"].quantity, 5);
    }

    #[test]
    fn qr_code_validity_window() {
        let created = Utc::now();
        let qr = OrderQrCode {
            id: 1,
            order_id: 1,
            qr_data: "https://pay.example/abc".into(),
            image: vec![],
            created_at: created,
            expires_at: created + QR_CODE_VALIDITY,
            is_used: false,
            used_at: None,
        };
        assert!(qr.is_valid_at(created + Duration::seconds(599)));
        assert!(!qr.is_valid_at(created + Duration::seconds(601)));
        let used = OrderQrCode { is_used: true, used_at: Some(created), ..qr };
        assert!(!used.is_valid_at(created));
    }
}
