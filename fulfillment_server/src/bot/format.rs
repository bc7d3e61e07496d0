use fulfillment_engine::{
    db_types::OrderStatusType,
    events::{NewOrderEvent, OrderEvent, PaymentConfirmedEvent, StatusChangedEvent},
    order_objects::OrderSnapshot,
};

use crate::bot::api::{InlineButton, InlineKeyboard};

pub const HELP_TEXT: &str = "🤖 <b>Order Management Bot</b>

<b>Commands:</b>
/orders - View pending orders
/preparing - View orders being prepared
/ready - View orders ready for delivery
/out - View orders out for delivery
/order [NUMBER] - View specific order details

<b>Example:</b>
/order MD00001

<b>Quick Actions:</b>
Use buttons on order messages to update status instantly!";

/// Escapes text for the bot's HTML parse mode. Customer-supplied fields always go through this.
pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            c => result.push(c),
        }
    }
    result
}

pub fn status_emoji(status: OrderStatusType) -> &'static str {
    match status {
        OrderStatusType::Pending => "⏳",
        OrderStatusType::Confirmed => "✅",
        OrderStatusType::Preparing => "👷",
        OrderStatusType::ReadyForDelivery => "📦",
        OrderStatusType::OutForDelivery => "🚚",
        OrderStatusType::Delivered => "🎉",
        OrderStatusType::Cancelled => "❌",
    }
}

pub fn format_order_message(order: &OrderSnapshot, include_items: bool) -> String {
    let payment_emoji = if order.is_cash_on_delivery() { "💰" } else { "💳" };
    let items = if include_items {
        order
            .items
            .iter()
            .map(|i| format!("  • {} x{} = ${}\n", escape_html(&i.name), i.quantity, i.subtotal))
            .collect::<String>()
    } else {
        String::new()
    };
    let mut message = format!(
        "📦 <b>Order #{number}</b>\n\n{status_emoji} Status: <b>{status}</b>\n{payment_emoji} Payment: \
         <b>{method}</b>\n\n👤 <b>Customer:</b>\n   Name: {name}\n   Phone: {phone}\n   Address: {address}\n   \
         Province: {province}\n\n{items}💰 Total: <b>${total}</b>\n⏰ Time: {time}\n",
        number = order.order_number,
        status_emoji = status_emoji(order.status),
        status = order.status.display_name(),
        method = order.payment_method,
        name = escape_html(&order.customer_name),
        phone = escape_html(&order.customer_phone),
        address = escape_html(&order.customer_address),
        province = escape_html(&order.customer_province),
        total = order.total,
        time = order.created_at.format("%Y-%m-%d %H:%M"),
    );
    if order.is_cash_on_delivery() {
        if order.payment_received {
            message.push_str("\n✅ Payment: <b>Received</b>");
        } else {
            message.push_str("\n⏳ Payment: <b>Pending</b>");
        }
    }
    if order.is_suspicious {
        let reason = order.suspicious_reason.as_deref().unwrap_or("flagged");
        message.push_str(&format!("\n⚠️ <b>Check this order:</b> {}", escape_html(reason)));
    }
    message
}

/// The buttons for the next step of an order. Terminal orders have none.
pub fn order_keyboard(order: &OrderSnapshot) -> InlineKeyboard {
    let n = &order.order_number;
    let mut keyboard = InlineKeyboard::default();
    let status_button = |text: &str, next: OrderStatusType| {
        InlineButton::callback(text.to_string(), format!("status_{n}_{next}"))
    };
    match order.status {
        OrderStatusType::Pending | OrderStatusType::Confirmed => {
            keyboard.add_row(status_button("👷 Start Preparing", OrderStatusType::Preparing));
        },
        OrderStatusType::Preparing => {
            keyboard.add_row(status_button("📦 Mark Ready", OrderStatusType::ReadyForDelivery));
            if order.is_cash_on_delivery() && !order.payment_received {
                keyboard.add_row(InlineButton::callback("🖨️ Get QR Code Link".to_string(), format!("qr_{n}")));
            }
        },
        OrderStatusType::ReadyForDelivery => {
            keyboard.add_row(status_button("🚚 Out for Delivery", OrderStatusType::OutForDelivery));
        },
        OrderStatusType::OutForDelivery => {
            keyboard.add_row(status_button("✅ Mark Delivered", OrderStatusType::Delivered));
        },
        OrderStatusType::Delivered | OrderStatusType::Cancelled => {},
    }
    keyboard
}

pub fn new_order_message(event: &NewOrderEvent) -> String {
    format!("🛒 <b>NEW ORDER RECEIVED!</b>\n\n{}", format_order_message(&event.order, true))
}

pub fn status_changed_notice(event: &StatusChangedEvent) -> String {
    format!(
        "{} Order #{} is now <b>{}</b>\nWas: {}\nBy: {}",
        status_emoji(event.new_status),
        event.order.order_number,
        event.new_status.display_name(),
        event.old_status.display_name(),
        escape_html(&event.changed_by)
    )
}

pub fn payment_confirmed_notice(event: &PaymentConfirmedEvent) -> String {
    format!(
        "💰 Payment received for order #{}\nAmount: <b>${}</b>\nConfirmed by: {}",
        event.order.order_number,
        event.order.total,
        escape_html(&event.confirmed_by)
    )
}

/// The fallback when a formatted message is refused.
pub fn plain_text_notice(event: &OrderEvent) -> String {
    let order = event.order();
    match event {
        OrderEvent::NewOrder(_) => format!(
            "New order {}: {} ({}), ${}, {}",
            order.order_number, order.customer_name, order.customer_phone, order.total, order.payment_method
        ),
        OrderEvent::StatusChanged(e) => {
            format!("Order {} changed from {} to {} by {}", order.order_number, e.old_status, e.new_status, e.changed_by)
        },
        OrderEvent::PaymentConfirmed(e) => {
            format!("Payment of ${} received for order {} by {}", order.total, order.order_number, e.confirmed_by)
        },
    }
}

pub fn listing_header(title: &str, emoji: &str, count: usize) -> String {
    format!("{emoji} <b>{title} ({count})</b>")
}

pub fn status_updated_message(order: &OrderSnapshot) -> String {
    format!("✅ Order #{} status updated to <b>{}</b>", order.order_number, order.status.display_name())
}

pub fn cod_qr_message(order: &OrderSnapshot, qr_image_url: &str, confirmation_url: &str) -> String {
    format!(
        "🖨️ <b>QR Code for Order #{number}</b>\n\n📋 <b>QR Code Image:</b>\n{qr_image_url}\n\n📱 <b>Confirmation \
         Page:</b>\n{confirmation_url}\n\n💡 <b>Instructions:</b>\n1. Open the QR code image link\n2. Print it\n3. Give \
         it to the delivery driver\n\n<b>Customer:</b> {name}\n<b>Total:</b> ${total}",
        number = order.order_number,
        name = escape_html(&order.customer_name),
        total = order.total,
    )
}
