use axum::{extract::State, http::HeaderMap, response::Json, routing::post, Router};
use bytes::Bytes;

use crate::{
    errors::ServiceError,
    payments::SIGNATURE_HEADER,
    services::payment_confirmation::WebhookAck,
    AppState,
};

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/payment-webhook", post(payment_webhook))
}

// The raw body is needed verbatim for signature verification.
#[utoipa::path(
    post,
    path = "/api/payment-webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted", body = WebhookAck),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 500, description = "Store failure; the processor will redeliver", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let ack = state.payments.handle_webhook(signature, &body).await?;
    Ok(Json(ack))
}
