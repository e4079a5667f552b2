use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mycology Store API",
        version = "0.1.0",
        description = r#"
# Mycology Store API

Storefront backend for a mushroom farm: catalog browsing, checkout through a
hosted payment page, payment confirmation webhooks, order tracking and an
admin back office.

## Authentication

Storefront endpoints are public. Admin endpoints require a bearer token from
`POST /api/admin/login`:

```
Authorization: Bearer <token>
```

The payment webhook is authenticated by its `Stripe-Signature` header.

## Error Handling

Failures share one envelope:

```json
{
  "success": false,
  "error": "Not found: Order 1234 not found",
  "request_id": "req-abc123",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "catalog", description = "Product catalog"),
        (name = "orders", description = "Order placement and tracking"),
        (name = "checkout", description = "Hosted payment sessions"),
        (name = "payments", description = "Payment processor webhooks"),
        (name = "accounts", description = "Customer accounts"),
        (name = "admin", description = "Back office"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        // Catalog
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,

        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::track_order,
        crate::handlers::orders::customer_orders,

        // Checkout and payments
        crate::handlers::checkout::create_checkout_session,
        crate::handlers::payment_webhooks::payment_webhook,

        // Accounts
        crate::handlers::accounts::register,
        crate::handlers::accounts::login,

        // Admin
        crate::auth::login_handler,
        crate::handlers::admin_products::list_products,
        crate::handlers::admin_products::get_product,
        crate::handlers::admin_products::create_product,
        crate::handlers::admin_products::update_product,
        crate::handlers::admin_products::delete_product,
        crate::handlers::admin_products::adjust_stock,
        crate::handlers::admin_orders::list_orders,
        crate::handlers::admin_orders::get_order,
        crate::handlers::admin_orders::update_order_status,
        crate::handlers::admin_orders::stale_orders,
        crate::handlers::dashboard::dashboard,

        crate::health_check,
    ),
    components(
        schemas(
            crate::entities::product::ProductCategory,
            crate::entities::order::OrderStatus,
            crate::services::catalog::ProductResponse,
            crate::services::catalog::ProductInput,
            crate::services::catalog::StockAdjustment,
            crate::services::checkout::CheckoutLine,
            crate::services::checkout::PlaceOrderRequest,
            crate::services::checkout::PlacedOrderResponse,
            crate::services::checkout::CheckoutSessionResponse,
            crate::services::pricing::PriceBreakdown,
            crate::services::orders::ShippingAddress,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderDetailResponse,
            crate::services::orders::StatusHistoryEntry,
            crate::services::payment_confirmation::WebhookAck,
            crate::services::payment_confirmation::ConfirmationOutcome,
            crate::services::dashboard::DashboardMetrics,
            crate::services::dashboard::MonthlyFigures,
            crate::services::dashboard::CategorySales,
            crate::services::accounts::RegisterCustomerInput,
            crate::services::accounts::LoginInput,
            crate::services::accounts::CustomerProfile,
            crate::handlers::orders::TrackOrderRequest,
            crate::handlers::checkout::CheckoutSessionRequest,
            crate::handlers::admin_orders::UpdateStatusRequest,
            crate::auth::AdminLoginRequest,
            crate::auth::AdminToken,
            crate::ResponseMeta,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}
