use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Extension, Router,
};
use chrono::Duration;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::AdminClaims,
    entities::order::OrderStatus,
    errors::ServiceError,
    handlers::common::{AppJson, AppQuery},
    services::orders::{OrderDetailResponse, OrderFilter, OrderResponse},
    ApiResponse, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    /// Matches order id, customer email or customer name
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StaleOrdersQuery {
    #[serde(default = "default_stale_minutes")]
    pub older_than_minutes: i64,
    #[serde(default = "default_stale_limit")]
    pub limit: u64,
}

fn default_stale_minutes() -> i64 {
    60
}

fn default_stale_limit() -> u64 {
    100
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

pub fn admin_order_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/orders", get(list_orders))
        .route("/admin/orders/stale", get(stale_orders))
        .route("/admin/orders/:id", get(get_order).put(update_order_status))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<Vec<OrderResponse>>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<OrderListQuery>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state
        .orders
        .list_orders(OrderFilter {
            status: query.status,
            search: query.search,
        })
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders/{id}",
    params(("id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items and status history", body = ApiResponse<OrderDetailResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<OrderDetailResponse>>, ServiceError> {
    Ok(Json(ApiResponse::success(state.orders.get_order_detail(&id).await?)))
}

/// Move an order along its lifecycle
#[utoipa::path(
    put,
    path = "/api/admin/orders/{id}",
    params(("id" = String, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent update or not enough stock", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminClaims>,
    Path(id): Path<String>,
    AppJson(request): AppJson<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let actor = format!("admin:{}", admin.username);
    let order = state
        .order_status
        .update_status(&id, request.status, &actor)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Pending orders that never completed payment
#[utoipa::path(
    get,
    path = "/api/admin/orders/stale",
    params(StaleOrdersQuery),
    responses(
        (status = 200, description = "Stale pending orders, oldest first", body = ApiResponse<Vec<OrderResponse>>),
        (status = 400, description = "Invalid age", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn stale_orders(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<StaleOrdersQuery>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let age = Duration::try_minutes(query.older_than_minutes)
        .filter(|age| *age >= Duration::zero())
        .ok_or_else(|| {
            ServiceError::ValidationError("older_than_minutes is out of range".into())
        })?;
    let orders = state
        .orders
        .list_stale_pending_orders(age, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}
