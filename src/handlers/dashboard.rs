use axum::{extract::State, response::Json, routing::get, Router};

use crate::{
    errors::ServiceError, services::dashboard::DashboardMetrics, ApiResponse, AppState,
};

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/admin/dashboard", get(dashboard))
}

#[utoipa::path(
    get,
    path = "/api/admin/dashboard",
    responses(
        (status = 200, description = "Back office metrics", body = ApiResponse<DashboardMetrics>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn dashboard(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DashboardMetrics>>, ServiceError> {
    Ok(Json(ApiResponse::success(state.dashboard.metrics().await?)))
}
