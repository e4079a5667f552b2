pub mod email;
pub mod templates;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;
use thiserror::Error;
use tracing::info;

use crate::config::AppConfig;
use crate::entities::order::{self, OrderStatus};
use crate::entities::order_item;

pub use email::EmailNotifier;

/// Customer message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    OrderConfirmation,
    OrderShipped,
    OrderDelivered,
}

impl NotificationKind {
    /// Message sent when an operator moves an order into `status`, if any
    pub fn for_status_change(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Shipped => Some(Self::OrderShipped),
            OrderStatus::Delivered => Some(Self::OrderDelivered),
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
}

/// Point-in-time copy of an order handed to notifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: String,
    pub reference: String,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SnapshotItem>,
}

impl OrderSnapshot {
    pub fn from_models(order: &order::Model, items: &[order_item::Model]) -> Self {
        Self {
            id: order.id.clone(),
            reference: order.reference(),
            customer_email: order.customer_email.clone(),
            customer_name: order.customer_name.clone(),
            status: order.status,
            total_amount: order.total_amount.round_dp(2),
            created_at: order.created_at,
            items: items
                .iter()
                .map(|item| SnapshotItem {
                    name: item.product_name.clone(),
                    quantity: item.quantity,
                    price: item.price.round_dp(2),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
    #[error("mail provider rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        kind: NotificationKind,
        order: &OrderSnapshot,
    ) -> Result<(), NotificationError>;
}

/// Logs the message instead of sending it; used when no mail API key is set
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        kind: NotificationKind,
        order: &OrderSnapshot,
    ) -> Result<(), NotificationError> {
        info!(
            order_id = %order.id,
            kind = %kind,
            to = %order.customer_email,
            "Email service not configured; would send notification"
        );
        Ok(())
    }
}

/// Picks the mail API notifier when an API key is configured
pub fn notifier_from_config(config: &AppConfig) -> Result<Arc<dyn Notifier>, NotificationError> {
    match config
        .email_api_key
        .as_ref()
        .filter(|key| !key.trim().is_empty())
    {
        Some(key) => Ok(Arc::new(EmailNotifier::new(
            config.email_api_url.clone(),
            key.clone(),
            config.email_from.clone(),
            config.public_base_url.clone(),
        )?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
