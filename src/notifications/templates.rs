use rust_decimal::Decimal;
use std::fmt::Write;

use super::{NotificationKind, OrderSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    pub subject: String,
    pub html: String,
}

pub fn render(kind: NotificationKind, order: &OrderSnapshot, shop_url: &str) -> EmailTemplate {
    let reference = &order.reference;
    let (subject, heading, body) = match kind {
        NotificationKind::OrderConfirmation => (
            format!("Order Confirmation #{}", reference),
            "Order Confirmed!",
            "We're preparing your fresh mushrooms! You'll receive another email when your order ships. Expected processing time: 1-2 business days.".to_string(),
        ),
        NotificationKind::OrderShipped => (
            format!("Your Order is On Its Way! #{}", reference),
            "Order Shipped!",
            "Your mushrooms are packed fresh! Standard shipping takes 3-5 business days. Store them in the refrigerator as soon as they arrive.".to_string(),
        ),
        NotificationKind::OrderDelivered => (
            format!("Order Delivered! How did we do? #{}", reference),
            "Order Delivered!",
            format!(
                "Your mushrooms have been delivered. We hope you enjoy cooking with them! <a href=\"{}/products\">Order again</a>",
                escape_html(shop_url.trim_end_matches('/'))
            ),
        ),
    };

    let mut html = String::new();
    let _ = write!(
        html,
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h1>{heading}</h1>\
         <p><strong>Order ID:</strong> #{reference}</p>\
         <p><strong>Order Date:</strong> {date}</p>\
         <h3>Items</h3><table>",
        heading = heading,
        reference = escape_html(reference),
        date = order.created_at.format("%Y-%m-%d"),
    );
    for item in &order.items {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>Quantity: {}</td><td>${}</td></tr>",
            escape_html(&item.name),
            item.quantity,
            money(item.price * Decimal::from(item.quantity)),
        );
    }
    let _ = write!(
        html,
        "</table><p><strong>Total: ${}</strong></p><p>{}</p>\
         <p>Fresh Mushroom Farm</p></div>",
        money(order.total_amount),
        body,
    );

    EmailTemplate { subject, html }
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
