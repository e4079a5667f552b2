use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument};

use super::{templates, NotificationError, NotificationKind, Notifier, OrderSnapshot};

/// Sends rendered order e-mails through a transactional mail HTTP API
#[derive(Clone)]
pub struct EmailNotifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
    shop_url: String,
}

#[derive(Debug, Serialize)]
struct OutboundEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl EmailNotifier {
    pub fn new(
        api_url: String,
        api_key: String,
        from: String,
        shop_url: String,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;
        Ok(Self {
            client,
            api_url,
            api_key,
            from,
            shop_url,
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    #[instrument(skip(self, order), fields(order_id = %order.id, kind = %kind))]
    async fn notify(
        &self,
        kind: NotificationKind,
        order: &OrderSnapshot,
    ) -> Result<(), NotificationError> {
        let template = templates::render(kind, order, &self.shop_url);
        let payload = OutboundEmail {
            from: &self.from,
            to: [&order.customer_email],
            subject: &template.subject,
            html: &template.html,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        info!(to = %order.customer_email, "Notification e-mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::OrderStatus;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn snapshot() -> OrderSnapshot {
        OrderSnapshot {
            id: "order-12345678".into(),
            reference: "12345678".into(),
            customer_email: "buyer@example.com".into(),
            customer_name: None,
            status: OrderStatus::Shipped,
            total_amount: dec!(64.80),
            created_at: Utc::now(),
            items: vec![],
        }
    }

    #[tokio::test]
    async fn posts_rendered_message_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(serde_json::json!({
                "to": ["buyer@example.com"],
                "subject": "Your Order is On Its Way! #12345678"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = EmailNotifier::new(
            format!("{}/emails", server.uri()),
            "re_test".into(),
            "Shop <orders@example.com>".into(),
            "http://shop".into(),
        )
        .unwrap();
        notifier
            .notify(NotificationKind::OrderShipped, &snapshot())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn provider_rejection_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid from"))
            .mount(&server)
            .await;

        let notifier = EmailNotifier::new(
            server.uri(),
            "re_test".into(),
            "bad".into(),
            "http://shop".into(),
        )
        .unwrap();
        let err = notifier
            .notify(NotificationKind::OrderConfirmation, &snapshot())
            .await
            .unwrap_err();
        assert_matches!(err, NotificationError::Rejected { status: 422, .. });
    }
}
