//! Mycology Store API
//!
//! Storefront backend for a mushroom farm: catalog, checkout through a hosted
//! payment page, webhook-driven payment confirmation, order tracking and an
//! admin back office.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod cart;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod payments;
pub mod services;
pub mod tracing;

use axum::{extract::State, http::HeaderValue, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

use crate::auth::AdminAuth;
use crate::payments::PaymentGateway;
use crate::services::{
    accounts::AccountService,
    catalog::CatalogService,
    checkout::{CheckoutService, CheckoutSettings},
    dashboard::DashboardService,
    order_status::OrderStatusService,
    orders::OrderService,
    payment_confirmation::PaymentConfirmationService,
    pricing::PricingPolicy,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub admin_auth: Arc<AdminAuth>,
    pub catalog: CatalogService,
    pub orders: OrderService,
    pub order_status: OrderStatusService,
    pub checkout: CheckoutService,
    pub payments: PaymentConfirmationService,
    pub dashboard: DashboardService,
    pub accounts: AccountService,
}

impl AppState {
    /// Wires every service against one pool, gateway and event channel
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: events::EventSender,
    ) -> Self {
        let checkout = CheckoutService::new(
            db.clone(),
            gateway,
            event_sender.clone(),
            CheckoutSettings {
                public_base_url: config.public_base_url.clone(),
                currency: config.currency.clone(),
                pricing: PricingPolicy::from(&config),
            },
        );
        let payments = PaymentConfirmationService::new(
            db.clone(),
            event_sender.clone(),
            config.payment_webhook_secret.clone(),
            config.payment_webhook_tolerance_secs,
        );

        Self {
            admin_auth: Arc::new(AdminAuth::from_config(&config)),
            catalog: CatalogService::new(db.clone()),
            orders: OrderService::new(db.clone()),
            order_status: OrderStatusService::new(db.clone(), event_sender.clone()),
            dashboard: DashboardService::new(db.clone(), config.low_stock_threshold),
            accounts: AccountService::new(db.clone()),
            checkout,
            payments,
            event_sender,
            config,
            db,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn message_is_optional() {
        let response = ApiResponse::success(1).with_message("created");
        assert_eq!(response.message.as_deref(), Some("created"));
        assert!(response.success);
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// All routes under `/api`
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .merge(handlers::public_routes())
        .merge(handlers::admin_routes(state.admin_auth.clone()))
}

/// Builds the full application with its middleware stack
pub fn app_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/", get(|| async { "mycology-store-api up" }))
        .nest("/api", api_routes(&state))
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("No CORS origins configured; cross-origin requests will be refused");
        CorsLayer::new()
    }
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service and database status", body = ApiResponse<Value>)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
