use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::entities::order::OrderStatus;
use crate::notifications::{NotificationKind, Notifier, OrderSnapshot};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends after a committed state change; delivery problems are only logged
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Events published after committed order state changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: String,
    },
    PaymentConfirmed {
        order: OrderSnapshot,
        session_id: String,
    },
    OrderStatusChanged {
        order: OrderSnapshot,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
}

/// Bounded channel pair for the notification loop
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Drains events and dispatches customer notifications until every sender is dropped
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Arc<dyn Notifier>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderPlaced { order_id } => {
                info!(order_id = %order_id, "Order placed");
            }
            Event::PaymentConfirmed { order, session_id } => {
                info!(order_id = %order.id, session_id = %session_id, "Payment confirmed");
                dispatch(&*notifier, NotificationKind::OrderConfirmation, &order).await;
            }
            Event::OrderStatusChanged {
                order,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order.id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "Order status changed"
                );
                if let Some(kind) = NotificationKind::for_status_change(new_status) {
                    dispatch(&*notifier, kind, &order).await;
                }
            }
        }
    }

    info!("Event processing loop stopped");
}

async fn dispatch(notifier: &dyn Notifier, kind: NotificationKind, order: &OrderSnapshot) {
    match notifier.notify(kind, order).await {
        Ok(()) => {
            counter!("mycology.notifications.sent", 1);
        }
        Err(e) => {
            counter!("mycology.notifications.failed", 1);
            error!(
                order_id = %order.id,
                kind = %kind,
                error = %e,
                "Failed to send customer notification"
            );
        }
    }
}
