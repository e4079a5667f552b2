pub mod common;

// Storefront
pub mod accounts;
pub mod checkout;
pub mod orders;
pub mod payment_webhooks;
pub mod products;

// Back office
pub mod admin_orders;
pub mod admin_products;
pub mod dashboard;

use axum::Router;
use std::sync::Arc;

use crate::auth::{self, AdminAuth, AuthRouterExt};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Customer-facing routes; no authentication
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .merge(products::catalog_routes())
        .merge(orders::order_routes())
        .merge(checkout::checkout_routes())
        .merge(payment_webhooks::webhook_routes())
        .merge(accounts::account_routes())
}

/// Back office routes behind the admin bearer token, plus the login that issues it
pub fn admin_routes(admin_auth: Arc<AdminAuth>) -> Router<AppState> {
    let guarded = Router::new()
        .merge(admin_products::admin_product_routes())
        .merge(admin_orders::admin_order_routes())
        .merge(dashboard::dashboard_routes())
        .with_admin(admin_auth);

    Router::new()
        .route("/admin/login", axum::routing::post(auth::login_handler))
        .merge(guarded)
}
