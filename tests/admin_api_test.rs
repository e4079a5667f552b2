//! Back office: admin login, catalog management, order handling and the dashboard.

mod common;

use axum::http::{Method, StatusCode};
use common::{completed_session, dec, TestApp};
use mycology_store_api::entities::{order::OrderStatus, product::ProductCategory};
use mycology_store_api::notifications::NotificationKind;
use rstest::rstest;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

fn product_payload(name: &str, price: &str, stock: i32) -> Value {
    json!({
        "name": name,
        "description": "Grown on hardwood logs",
        "price": price,
        "category": "dried",
        "strain": "Hericium erinaceus",
        "stock_quantity": stock,
        "image_urls": ["https://cdn.example.com/img/1.jpg"]
    })
}

#[tokio::test]
async fn admin_login_issues_a_usable_token() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/admin/login",
            Some(json!({ "username": "admin", "password": "admin123" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["token_type"], "Bearer");
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(Method::GET, "/api/admin/orders", None, Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_login_rejects_wrong_password() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/admin/login",
            Some(json!({ "username": "admin", "password": "guess" })),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[rstest]
#[case(Method::GET, "/api/admin/products")]
#[case(Method::GET, "/api/admin/orders")]
#[case(Method::GET, "/api/admin/orders/stale")]
#[case(Method::GET, "/api/admin/dashboard")]
#[case(Method::DELETE, "/api/admin/products/1")]
#[tokio::test]
async fn admin_routes_require_a_token(#[case] method: Method, #[case] uri: &str) {
    let app = TestApp::new().await;

    let (status, _) = app.request(method.clone(), uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.request(method, uri, None, Some("not.a.jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tokens_signed_with_another_secret_are_rejected() {
    let app = TestApp::new().await;
    let other = TestApp::with_config(|cfg| {
        cfg.jwt_secret = "another_secret_key_that_is_also_32_chars!".to_string()
    })
    .await;

    let (status, _) = app
        .request(Method::GET, "/api/admin/orders", None, Some(other.admin_token()))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn product_lifecycle_through_the_back_office() {
    let app = TestApp::new().await;

    let (status, body) = app
        .admin(
            Method::POST,
            "/api/admin/products",
            Some(product_payload("Dried Lion's Mane", "18.50", 12)),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["category"], "dried");
    assert_eq!(body["data"]["is_active"], true);

    let mut update = product_payload("Dried Lion's Mane 50g", "19.00", 12);
    update["category"] = json!("supplements");
    let (status, body) = app
        .admin(Method::PUT, &format!("/api/admin/products/{}", id), Some(update))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["name"], "Dried Lion's Mane 50g");
    assert_eq!(dec(&body["data"]["price"]), dec!(19.00));

    let (status, body) = app
        .request(Method::GET, "/api/products?category=supplements", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .admin(Method::DELETE, &format!("/api/admin/products/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);

    // Archived products leave the storefront but stay visible to admins
    let (status, _) = app
        .request(Method::GET, &format!("/api/products/{}", id), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = app
        .admin(Method::GET, &format!("/api/admin/products/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);
}

#[tokio::test]
async fn invalid_product_payloads_are_rejected() {
    let app = TestApp::new().await;

    let (status, _) = app
        .admin(Method::POST, "/api/admin/products", Some(product_payload("", "10.00", 1)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .admin(
            Method::POST,
            "/api/admin/products",
            Some(product_payload("Negative", "-1.00", 1)),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad_category = product_payload("Truffle", "99.00", 1);
    bad_category["category"] = json!("truffles");
    let (status, _) = app
        .admin(Method::POST, "/api/admin/products", Some(bad_category))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .admin(
            Method::PUT,
            "/api/admin/products/4242",
            Some(product_payload("Ghost", "1.00", 1)),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stock_adjustments_are_bounded_at_zero() {
    let app = TestApp::new().await;
    let oyster = app.seed_product("Pink Oyster", dec!(9.00), 4).await;
    let uri = format!("/api/admin/products/{}/stock", oyster.id);

    let (status, body) = app.admin(Method::POST, &uri, Some(json!({ "delta": 6 }))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["stock_quantity"], 10);

    let (status, _) = app.admin(Method::POST, &uri, Some(json!({ "delta": -11 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.stock_of(oyster.id).await, 10);
}

#[tokio::test]
async fn extreme_stock_deltas_are_rejected_and_catalog_stays_readable() {
    let app = TestApp::new().await;
    let oyster = app.seed_product("Golden Oyster", dec!(9.00), 2).await;
    let uri = format!("/api/admin/products/{}/stock", oyster.id);

    for delta in [i32::MIN, i32::MAX] {
        let (status, body) = app
            .admin(Method::POST, &uri, Some(json!({ "delta": delta })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "delta {}: {}", delta, body);
        assert_eq!(body["success"], false);
    }
    assert_eq!(app.stock_of(oyster.id).await, 2);

    let (status, body) = app.request(Method::GET, "/api/products", None, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"][0]["stock_quantity"], 2);
}

#[tokio::test]
async fn order_listing_filters_and_searches() {
    let app = TestApp::new().await;
    let reishi = app.seed_product("Reishi", dec!(20.00), 20).await;
    let ada = app.place_order("ada@example.com", &[(reishi.id, 1)]).await;
    let grace = app.place_order("grace@example.com", &[(reishi.id, 2)]).await;
    app.deliver_webhook(&completed_session("cs_grace", &grace)).await;

    let (status, body) = app.admin(Method::GET, "/api/admin/orders", None).await;
    assert_eq!(status, StatusCode::OK);
    let all = body["data"].as_array().unwrap();
    assert_eq!(all.len(), 2);
    // newest first
    assert_eq!(all[0]["id"], grace.as_str());

    let (_, body) = app
        .admin(Method::GET, "/api/admin/orders?status=pending", None)
        .await;
    let pending = body["data"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["id"], ada.as_str());

    let (_, body) = app
        .admin(Method::GET, "/api/admin/orders?search=GRACE", None)
        .await;
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["customer_email"], "grace@example.com");

    let (status, _) = app
        .admin(Method::GET, "/api/admin/orders?status=lost", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_search_treats_wildcards_as_text() {
    let app = TestApp::new().await;
    let reishi = app.seed_product("Reishi", dec!(20.00), 20).await;
    app.place_order("a_b@example.com", &[(reishi.id, 1)]).await;
    app.place_order("axb@example.com", &[(reishi.id, 1)]).await;

    let (status, body) = app
        .admin(Method::GET, "/api/admin/orders?search=a_b", None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["customer_email"], "a_b@example.com");

    let (_, body) = app
        .admin(Method::GET, "/api/admin/orders?search=%25", None)
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn order_detail_includes_items_and_history() {
    let app = TestApp::new().await;
    let chaga = app.seed_product("Chaga", dec!(15.00), 10).await;
    let order_id = app.place_order("ada@example.com", &[(chaga.id, 2)]).await;
    app.deliver_webhook(&completed_session("cs_detail", &order_id)).await;

    let (status, body) = app
        .admin(Method::GET, &format!("/api/admin/orders/{}", order_id), None)
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    let data = &body["data"];
    assert_eq!(data["status"], "processing");
    assert_eq!(data["items"][0]["product_name"], "Chaga");
    assert_eq!(data["items"][0]["quantity"], 2);
    assert_eq!(dec(&data["items"][0]["line_total"]), dec!(30.00));
    let history = data["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["from_status"], Value::Null);
    assert_eq!(history[0]["to_status"], "pending");
    assert_eq!(history[1]["to_status"], "processing");

    let (status, _) = app
        .admin(Method::GET, "/api/admin/orders/does-not-exist", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fulfilment_moves_forward_and_notifies() {
    let app = TestApp::new().await;
    let kit = app
        .seed_product_in("Oyster Grow Kit", dec!(30.00), 5, ProductCategory::Kits)
        .await;
    let order_id = app.place_order("ada@example.com", &[(kit.id, 1)]).await;
    app.deliver_webhook(&completed_session("cs_ship", &order_id)).await;
    let uri = format!("/api/admin/orders/{}", order_id);

    let (status, body) = app
        .admin(Method::PUT, &uri, Some(json!({ "status": "shipped" })))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "shipped");

    let (status, _) = app
        .admin(Method::PUT, &uri, Some(json!({ "status": "processing" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .admin(Method::PUT, &uri, Some(json!({ "status": "delivered" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .admin(Method::PUT, &uri, Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.wait_for_notifications(3).await;
    assert_eq!(app.notifier.count(NotificationKind::OrderConfirmation, &order_id), 1);
    assert_eq!(app.notifier.count(NotificationKind::OrderShipped, &order_id), 1);
    assert_eq!(app.notifier.count(NotificationKind::OrderDelivered, &order_id), 1);

    let history = app.state.orders.status_history(&order_id).await.unwrap();
    assert_eq!(history.last().unwrap().actor, "admin:admin");
    // Stock was taken once, at payment time
    assert_eq!(app.stock_of(kit.id).await, 4);
}

#[tokio::test]
async fn cancelling_a_paid_order_restocks() {
    let app = TestApp::new().await;
    let maitake = app.seed_product("Maitake", dec!(14.00), 5).await;
    let order_id = app.place_order("ada@example.com", &[(maitake.id, 2)]).await;
    app.deliver_webhook(&completed_session("cs_cancel", &order_id)).await;
    assert_eq!(app.stock_of(maitake.id).await, 3);

    let (status, body) = app
        .admin(
            Method::PUT,
            &format!("/api/admin/orders/{}", order_id),
            Some(json!({ "status": "cancelled" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(app.stock_of(maitake.id).await, 5);
}

#[tokio::test]
async fn cancelling_an_unpaid_order_leaves_stock_alone() {
    let app = TestApp::new().await;
    let enoki = app.seed_product("Enoki", dec!(6.00), 5).await;
    let order_id = app.place_order("ada@example.com", &[(enoki.id, 2)]).await;

    app.state
        .order_status
        .update_status(&order_id, OrderStatus::Cancelled, "admin:test")
        .await
        .unwrap();

    assert_eq!(app.stock_of(enoki.id).await, 5);
}

#[tokio::test]
async fn admin_can_ship_unpaid_order_when_stock_allows() {
    let app = TestApp::new().await;
    let enoki = app.seed_product("Enoki", dec!(6.00), 1).await;
    let order_id = app.place_order("ada@example.com", &[(enoki.id, 1)]).await;

    let (status, _) = app
        .admin(
            Method::PUT,
            &format!("/api/admin/orders/{}", order_id),
            Some(json!({ "status": "shipped" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.stock_of(enoki.id).await, 0);

    app.wait_for_notifications(1).await;
    assert_eq!(app.notifier.count(NotificationKind::OrderShipped, &order_id), 1);
    assert_eq!(app.notifier.sent().len(), 1);
}

#[tokio::test]
async fn stale_listing_only_returns_old_pending_orders() {
    let app = TestApp::new().await;
    let reishi = app.seed_product("Reishi", dec!(20.00), 10).await;
    let pending = app.place_order("ada@example.com", &[(reishi.id, 1)]).await;
    let paid = app.place_order("grace@example.com", &[(reishi.id, 1)]).await;
    app.deliver_webhook(&completed_session("cs_paid", &paid)).await;

    let (status, body) = app.admin(Method::GET, "/api/admin/orders/stale", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = app
        .admin(Method::GET, "/api/admin/orders/stale?older_than_minutes=0", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let stale = body["data"].as_array().unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0]["id"], pending.as_str());

    let (status, _) = app
        .admin(Method::GET, "/api/admin/orders/stale?older_than_minutes=-5", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dashboard_summarises_the_month() {
    let app = TestApp::with_config(|cfg| cfg.low_stock_threshold = 5).await;
    let reishi = app
        .seed_product_in("Reishi Powder", dec!(20.00), 10, ProductCategory::Supplements)
        .await;
    let kit = app
        .seed_product_in("Oyster Grow Kit", dec!(30.00), 3, ProductCategory::Kits)
        .await;

    let paid = app.place_order("ada@example.com", &[(reishi.id, 3)]).await;
    app.deliver_webhook(&completed_session("cs_dash", &paid)).await;
    app.place_order("grace@example.com", &[(kit.id, 1)]).await;
    let cancelled = app.place_order("linus@example.com", &[(kit.id, 1)]).await;
    app.state
        .order_status
        .update_status(&cancelled, OrderStatus::Cancelled, "admin:test")
        .await
        .unwrap();

    let (status, body) = app.admin(Method::GET, "/api/admin/dashboard", None).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    let data = &body["data"];
    // 60.00 + 4.80 tax, then 30.00 + 2.40 tax + 9.99 shipping
    assert_eq!(dec(&data["month"]["revenue"]), dec!(107.19));
    assert_eq!(data["month"]["order_count"], 2);
    assert_eq!(data["pending_orders"], 1);
    assert_eq!(data["active_products"], 2);
    assert_eq!(data["recent_orders"].as_array().unwrap().len(), 3);

    let low_stock = data["low_stock"].as_array().unwrap();
    assert_eq!(low_stock.len(), 1);
    assert_eq!(low_stock[0]["name"], "Oyster Grow Kit");

    let categories = data["category_sales"].as_array().unwrap();
    assert_eq!(categories[0]["category"], "supplements");
    assert_eq!(dec(&categories[0]["revenue"]), dec!(60.00));
}
