use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{GatewayError, PaymentGateway, PaymentSession, SessionRequest};

/// Hosted checkout client speaking the Stripe form-encoded REST API
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: Option<String>,
    max_retries: u32,
    backoff_base: Duration,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, secret_key: Option<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.filter(|k| !k.trim().is_empty()),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        })
    }

    /// Overrides the retry schedule (attempts, first backoff)
    pub fn with_retry(mut self, max_retries: u32, backoff_base: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.backoff_base = backoff_base;
        self
    }

    fn form_fields(request: &SessionRequest) -> Vec<(String, String)> {
        let mut fields = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("customer_email".to_string(), request.customer_email.clone()),
            ("client_reference_id".to_string(), request.order_id.clone()),
            ("metadata[orderId]".to_string(), request.order_id.clone()),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            fields.push((
                format!("{}[price_data][currency]", prefix),
                request.currency.clone(),
            ));
            fields.push((
                format!("{}[price_data][product_data][name]", prefix),
                item.name.clone(),
            ));
            if let Some(description) = &item.description {
                fields.push((
                    format!("{}[price_data][product_data][description]", prefix),
                    description.clone(),
                ));
            }
            fields.push((
                format!("{}[price_data][unit_amount]", prefix),
                item.unit_amount.to_string(),
            ));
            fields.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
        }

        fields
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(&self, request: SessionRequest) -> Result<PaymentSession, GatewayError> {
        let secret = self.secret_key.as_ref().ok_or(GatewayError::NotConfigured)?;
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        let fields = Self::form_fields(&request);
        // One key across retries so the processor never creates two sessions.
        let idempotency_key = format!("checkout-{}-{}", request.order_id, Uuid::new_v4());

        let mut last_error = GatewayError::Transport("no attempt made".to_string());
        for attempt in 1..=self.max_retries {
            let response = self
                .client
                .post(&url)
                .bearer_auth(secret)
                .header("Idempotency-Key", &idempotency_key)
                .form(&fields)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    let body: CheckoutSessionResponse = response
                        .json()
                        .await
                        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
                    let url = body.url.ok_or_else(|| {
                        GatewayError::InvalidResponse("session has no url".to_string())
                    })?;
                    info!(session_id = %body.id, "Payment session created");
                    return Ok(PaymentSession { id: body.id, url });
                }
                Ok(response) => {
                    let status = response.status();
                    let message = response
                        .json::<ApiErrorBody>()
                        .await
                        .ok()
                        .and_then(|b| b.error.message)
                        .unwrap_or_else(|| status.to_string());
                    warn!(
                        "Payment session request failed with status {} (attempt {}/{})",
                        status, attempt, self.max_retries
                    );
                    last_error = GatewayError::Rejected {
                        status: status.as_u16(),
                        message,
                    };
                    if !status.is_server_error() && status.as_u16() != 429 {
                        return Err(last_error);
                    }
                }
                Err(e) => {
                    warn!(
                        "Payment session request error: {} (attempt {}/{})",
                        e, attempt, self.max_retries
                    );
                    last_error = GatewayError::Transport(e.to_string());
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(self.backoff_base * 2_u32.pow(attempt - 1)).await;
            }
        }

        Err(last_error)
    }
}
