use axum::{
    extract::{Path, State},
    response::{Json, Response},
    routing::{get, post},
    Extension, Router,
};
use tracing::info;

use crate::{
    auth::AdminClaims,
    errors::ServiceError,
    handlers::common::{created_response, AppJson},
    services::catalog::{ProductInput, ProductResponse, StockAdjustment},
    ApiResponse, AppState,
};

pub fn admin_product_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/products", get(list_products).post(create_product))
        .route(
            "/admin/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/admin/products/:id/stock", post(adjust_stock))
}

/// Every product including archived ones
#[utoipa::path(
    get,
    path = "/api/admin/products",
    responses(
        (status = 200, description = "All products", body = ApiResponse<Vec<ProductResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProductResponse>>>, ServiceError> {
    Ok(Json(ApiResponse::success(state.catalog.list_all().await?)))
}

#[utoipa::path(
    get,
    path = "/api/admin/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<ProductResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    Ok(Json(ApiResponse::success(state.catalog.get(id).await?)))
}

#[utoipa::path(
    post,
    path = "/api/admin/products",
    request_body = ProductInput,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Missing or invalid fields", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn create_product(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminClaims>,
    AppJson(input): AppJson<ProductInput>,
) -> Result<Response, ServiceError> {
    let product = state.catalog.create(input).await?;
    info!(admin = %admin.username, product_id = product.id, "Admin created product");
    Ok(created_response(product))
}

#[utoipa::path(
    put,
    path = "/api/admin/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    request_body = ProductInput,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Missing or invalid fields", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(input): AppJson<ProductInput>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    Ok(Json(ApiResponse::success(state.catalog.update(id, input).await?)))
}

/// Archives the product (soft delete)
#[utoipa::path(
    delete,
    path = "/api/admin/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product archived", body = ApiResponse<ProductResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminClaims>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let product = state.catalog.soft_delete(id).await?;
    info!(admin = %admin.username, product_id = id, "Admin archived product");
    Ok(Json(ApiResponse::success(product)))
}

#[utoipa::path(
    post,
    path = "/api/admin/products/{id}/stock",
    params(("id" = i32, Path, description = "Product id")),
    request_body = StockAdjustment,
    responses(
        (status = 200, description = "Stock adjusted", body = ApiResponse<ProductResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Would drive stock below zero", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(adjustment): AppJson<StockAdjustment>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let product = state.catalog.adjust_stock(id, adjustment.delta).await?;
    Ok(Json(ApiResponse::success(product)))
}
