use axum::{extract::State, response::Json, routing::post, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    errors::ServiceError, handlers::common::AppJson,
    services::checkout::CheckoutSessionResponse, ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutSessionRequest {
    #[serde(alias = "orderId")]
    #[validate(length(min = 1, message = "Order ID is required"))]
    pub order_id: String,
}

pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/checkout-session", post(create_checkout_session))
}

/// Start (or restart) hosted payment for a pending order
#[utoipa::path(
    post,
    path = "/api/checkout-session",
    request_body = CheckoutSessionRequest,
    responses(
        (status = 200, description = "Session created", body = ApiResponse<CheckoutSessionResponse>),
        (status = 400, description = "Missing order id", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order no longer awaiting payment", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider unavailable; retry", body = crate::errors::ErrorResponse)
    ),
    tag = "checkout"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    AppJson(request): AppJson<CheckoutSessionRequest>,
) -> Result<Json<ApiResponse<CheckoutSessionResponse>>, ServiceError> {
    request.validate()?;
    let session = state.checkout.start_payment_session(&request.order_id).await?;
    Ok(Json(ApiResponse::success(session)))
}
