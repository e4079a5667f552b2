//! Payment confirmation driven by processor webhooks.
//!
//! A `checkout.session.completed` event moves its order from `pending` to
//! `processing` exactly once. The session id is recorded on the order under a
//! unique idempotency key, so redelivered or concurrent events are no-ops.

use chrono::Utc;
use metrics::counter;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    db::{begin_write, DbPool},
    entities::order::{self, Entity as Order, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    payments::verify_signature,
    services::{
        order_status::{apply_transition, PaymentMark},
        orders::snapshot,
    },
};

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: SessionObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionObject {
    pub id: String,
    #[serde(default)]
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub client_reference_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionMetadata {
    #[serde(rename = "orderId", alias = "order_id", default)]
    pub order_id: Option<String>,
}

impl SessionObject {
    fn order_id(&self) -> Option<&str> {
        self.metadata
            .order_id
            .as_deref()
            .or(self.client_reference_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfirmationOutcome {
    Confirmed,
    /// Already confirmed, or no longer awaiting payment
    Duplicate,
    UnknownOrder,
    /// Event type this service does not act on
    Ignored,
    /// Stock ran out before payment arrived; order left pending
    StockUnavailable,
}

/// Body returned to the processor
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: ConfirmationOutcome,
}

pub fn idempotency_key(session_id: &str) -> String {
    format!("pay:{}", session_id)
}

#[derive(Clone)]
pub struct PaymentConfirmationService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    webhook_secret: Option<String>,
    tolerance_secs: u64,
}

impl PaymentConfirmationService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        webhook_secret: Option<String>,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            webhook_secret,
            tolerance_secs,
        }
    }

    /// Authenticates and applies one webhook delivery. Errors are reserved for
    /// bad signatures, unparseable bodies and store failures; everything else
    /// is acknowledged so the processor stops retrying.
    #[instrument(skip(self, signature, payload), fields(bytes = payload.len()))]
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookAck, ServiceError> {
        let secret = self.webhook_secret.as_deref().unwrap_or_default();
        if let Err(e) = verify_signature(signature, payload, secret, self.tolerance_secs, Utc::now().timestamp()) {
            counter!("mycology.webhooks.rejected", 1);
            warn!(error = %e, "Payment webhook signature verification failed");
            return Err(ServiceError::AuthError(format!("Invalid webhook signature: {}", e)));
        }

        let event: WebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            ServiceError::ValidationError(format!("Invalid webhook payload: {}", e))
        })?;

        if event.event_type != CHECKOUT_COMPLETED {
            info!(event_type = %event.event_type, "Ignoring unhandled webhook event");
            return Ok(ack(ConfirmationOutcome::Ignored));
        }

        let session = event.data.object;
        let Some(order_id) = session.order_id() else {
            warn!(session_id = %session.id, "Completed session carries no order id");
            return Ok(ack(ConfirmationOutcome::UnknownOrder));
        };

        let outcome = match self.confirm_payment(order_id, &session.id).await {
            Ok(outcome) => outcome,
            Err(ServiceError::InsufficientStock(msg)) => {
                error!(order_id, session_id = %session.id, reason = %msg, "Paid order could not be fulfilled from stock");
                ConfirmationOutcome::StockUnavailable
            }
            Err(e) => return Err(e),
        };
        Ok(ack(outcome))
    }

    /// Moves `order_id` to processing and records `session_id`. Repeated
    /// calls for the same session report `Duplicate` without side effects.
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        order_id: &str,
        session_id: &str,
    ) -> Result<ConfirmationOutcome, ServiceError> {
        let key = idempotency_key(session_id);
        let txn = begin_write(&self.db_pool).await?;

        let seen = Order::find()
            .filter(order::Column::PaymentIdempotencyKey.eq(key.clone()))
            .one(&txn)
            .await?;
        if let Some(existing) = seen {
            counter!("mycology.payments.duplicates", 1);
            info!(order_id = %existing.id, "Payment already confirmed");
            return Ok(ConfirmationOutcome::Duplicate);
        }

        let Some(order) = Order::find_by_id(order_id.to_string()).one(&txn).await? else {
            warn!(order_id, "Payment confirmed for unknown order");
            return Ok(ConfirmationOutcome::UnknownOrder);
        };
        if order.status != OrderStatus::Pending {
            counter!("mycology.payments.duplicates", 1);
            info!(order_id, status = %order.status, "Order is no longer pending; ignoring payment event");
            return Ok(ConfirmationOutcome::Duplicate);
        }

        let mark = PaymentMark {
            session_id,
            idempotency_key: &key,
        };
        let updated = match apply_transition(&txn, &order, OrderStatus::Processing, "payment", Some(mark)).await {
            Ok(updated) => updated,
            Err(ServiceError::Conflict(_)) => {
                counter!("mycology.payments.duplicates", 1);
                return Ok(ConfirmationOutcome::Duplicate);
            }
            Err(e) => return Err(e),
        };
        let snapshot = snapshot(&txn, &updated).await?;
        txn.commit().await?;

        counter!("mycology.payments.confirmed", 1);
        info!(order_id, "Payment confirmed; order is processing");
        self.event_sender
            .send_or_log(Event::PaymentConfirmed {
                order: snapshot,
                session_id: session_id.to_string(),
            })
            .await;

        Ok(ConfirmationOutcome::Confirmed)
    }
}

fn ack(outcome: ConfirmationOutcome) -> WebhookAck {
    WebhookAck {
        received: true,
        outcome,
    }
}
