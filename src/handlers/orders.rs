use axum::{
    extract::State,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    errors::ServiceError,
    handlers::common::{created_response, AppJson, AppQuery},
    services::{
        checkout::{PlaceOrderRequest, PlacedOrderResponse},
        orders::OrderResponse,
    },
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TrackOrderRequest {
    /// Full order id or its 8-character reference
    #[serde(alias = "orderId")]
    #[validate(length(min = 1, message = "Order ID is required"))]
    pub order_id: String,
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CustomerOrdersQuery {
    pub email: Option<String>,
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/track", post(track_order))
        .route("/orders/user", get(customer_orders))
}

/// Create a pending order from the cart
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<PlacedOrderResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Not enough stock", body = crate::errors::ErrorResponse),
        (status = 500, description = "Order could not be stored", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    AppJson(request): AppJson<PlaceOrderRequest>,
) -> Result<Response, ServiceError> {
    let placed = state.checkout.place_order(request).await?;
    Ok(created_response(placed))
}

/// Look up an order by id or reference plus the email it was placed with
#[utoipa::path(
    post,
    path = "/api/orders/track",
    request_body = TrackOrderRequest,
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Missing order id or email", body = crate::errors::ErrorResponse),
        (status = 404, description = "No order matches", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn track_order(
    State(state): State<AppState>,
    AppJson(request): AppJson<TrackOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    request.validate()?;
    let order = state.orders.track(&request.order_id, &request.email).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    get,
    path = "/api/orders/user",
    params(CustomerOrdersQuery),
    responses(
        (status = 200, description = "Orders for the email, newest first", body = ApiResponse<Vec<OrderResponse>>),
        (status = 400, description = "Email missing", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn customer_orders(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<CustomerOrdersQuery>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let email = query.email.unwrap_or_default();
    let orders = state.orders.orders_for_email(&email).await?;
    Ok(Json(ApiResponse::success(orders)))
}
