/*!
 * # Admin Authentication
 *
 * The back office is guarded by a single configured credential pair. A
 * successful login yields an HS256 bearer token carrying an `isAdmin` claim.
 * Verification checks the signature and expiry only; there is no revocation
 * list, so tokens stay valid until they expire.
 */

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    config::AppConfig, errors::ServiceError, payments::signature::constant_time_eq, ApiResponse,
    AppState,
};

/// Claims carried by an admin token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminClaims {
    pub sub: String,
    pub username: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Administrator access required")]
    NotAdmin,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotAdmin => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(msg) => ServiceError::InternalError(msg),
            other => ServiceError::AuthError(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AdminLoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminToken {
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Issues and verifies admin bearer tokens
#[derive(Clone)]
pub struct AdminAuth {
    jwt_secret: String,
    username: String,
    password: String,
    ttl_secs: u64,
}

impl AdminAuth {
    pub fn new(jwt_secret: String, username: String, password: String, ttl_secs: u64) -> Self {
        Self {
            jwt_secret,
            username,
            password,
            ttl_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.jwt_secret.clone(),
            config.admin_username.clone(),
            config.admin_password.clone(),
            config.admin_token_ttl_secs,
        )
    }

    /// Checks the credential pair and issues a token
    pub fn login(&self, username: &str, password: &str) -> Result<AdminToken, AuthError> {
        let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        if !(user_ok & pass_ok) {
            return Err(AuthError::InvalidCredentials);
        }
        self.issue(username)
    }

    pub fn issue(&self, username: &str) -> Result<AdminToken, AuthError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl_secs)
            .map_err(|_| AuthError::TokenCreation("token lifetime out of range".into()))?;
        let claims = AdminClaims {
            sub: username.to_string(),
            username: username.to_string(),
            is_admin: true,
            iat: now,
            exp: now + ttl,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(AdminToken {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.ttl_secs,
        })
    }

    /// Signature and expiry check
    pub fn verify(&self, token: &str) -> Result<AdminClaims, AuthError> {
        let claims = decode::<AdminClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        if !claims.is_admin {
            return Err(AuthError::NotAdmin);
        }
        Ok(claims)
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Rejects requests without a valid admin token and exposes the claims as a
/// request extension.
pub async fn admin_middleware(
    State(auth): State<Arc<AdminAuth>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = bearer_token(&request).ok_or(AuthError::MissingToken)?;
    let claims = auth.verify(token).map_err(|e| {
        warn!(error = %e, path = %request.uri().path(), "Admin token rejected");
        e
    })?;

    debug!(admin = %claims.username, "Admin request authorized");
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Extension methods for Router to add the admin guard
pub trait AuthRouterExt {
    fn with_admin(self, auth: Arc<AdminAuth>) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_admin(self, auth: Arc<AdminAuth>) -> Self {
        self.layer(axum::middleware::from_fn_with_state(auth, admin_middleware))
    }
}

/// Exchange the admin credential pair for a bearer token
#[utoipa::path(
    post,
    path = "/api/admin/login",
    request_body = AdminLoginRequest,
    responses(
        (status = 200, description = "Token issued", body = ApiResponse<AdminToken>),
        (status = 400, description = "Missing fields", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<AdminLoginRequest>,
) -> Result<Json<ApiResponse<AdminToken>>, ServiceError> {
    request.validate()?;
    let token = state
        .admin_auth
        .login(&request.username, &request.password)
        .map_err(|e| {
            warn!("Admin login rejected");
            e
        })?;
    info!(admin = %request.username, "Admin logged in");
    Ok(Json(ApiResponse::success(token)))
}
