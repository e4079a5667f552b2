use axum::{
    extract::State,
    response::{Json, Response},
    routing::post,
    Router,
};

use crate::{
    errors::ServiceError,
    handlers::common::{created_response, AppJson},
    services::accounts::{CustomerProfile, LoginInput, RegisterCustomerInput},
    ApiResponse, AppState,
};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterCustomerInput,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<CustomerProfile>),
        (status = 400, description = "Missing or invalid fields", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "accounts"
)]
pub async fn register(
    State(state): State<AppState>,
    AppJson(input): AppJson<RegisterCustomerInput>,
) -> Result<Response, ServiceError> {
    let profile = state.accounts.register(input).await?;
    Ok(created_response(profile))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginInput,
    responses(
        (status = 200, description = "Credentials accepted", body = ApiResponse<CustomerProfile>),
        (status = 401, description = "Invalid email or password", body = crate::errors::ErrorResponse)
    ),
    tag = "accounts"
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(input): AppJson<LoginInput>,
) -> Result<Json<ApiResponse<CustomerProfile>>, ServiceError> {
    Ok(Json(ApiResponse::success(state.accounts.login(input).await?)))
}
