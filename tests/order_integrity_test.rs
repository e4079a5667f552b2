//! All-or-nothing order writes and stock that never oversells.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{order_body, TestApp};
use mycology_store_api::{
    entities::{order, order::OrderStatus, order_item, order_status_history},
    errors::ServiceError,
    services::payment_confirmation::ConfirmationOutcome,
};
use rust_decimal_macros::dec;
use sea_orm::{ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait, Statement};

#[tokio::test]
async fn failed_item_insert_leaves_no_partial_order() {
    let app = TestApp::new().await;
    let first = app.seed_product("Lion's Mane", dec!(12.00), 10).await;
    let second = app.seed_product("Reishi", dec!(20.00), 10).await;

    // Second line item of any order fails to insert
    app.state
        .db
        .execute(Statement::from_string(
            DbBackend::Sqlite,
            "CREATE TRIGGER reject_second_line BEFORE INSERT ON order_items \
             WHEN (SELECT COUNT(*) FROM order_items WHERE order_id = NEW.order_id) >= 1 \
             BEGIN SELECT RAISE(ABORT, 'boom'); END;"
                .to_string(),
        ))
        .await
        .unwrap();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/orders",
            Some(order_body("ada@example.com", &[(first.id, 1), (second.id, 1)])),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to create order");

    let db = &*app.state.db;
    assert_eq!(order::Entity::find().count(db).await.unwrap(), 0);
    assert_eq!(order_item::Entity::find().count(db).await.unwrap(), 0);
    assert_eq!(order_status_history::Entity::find().count(db).await.unwrap(), 0);
}

#[tokio::test]
async fn single_line_orders_still_succeed_with_the_trigger_in_place() {
    let app = TestApp::new().await;
    let first = app.seed_product("Lion's Mane", dec!(12.00), 10).await;
    app.state
        .db
        .execute(Statement::from_string(
            DbBackend::Sqlite,
            "CREATE TRIGGER reject_second_line BEFORE INSERT ON order_items \
             WHEN (SELECT COUNT(*) FROM order_items WHERE order_id = NEW.order_id) >= 1 \
             BEGIN SELECT RAISE(ABORT, 'boom'); END;"
                .to_string(),
        ))
        .await
        .unwrap();

    app.place_order("ada@example.com", &[(first.id, 1)]).await;

    let db = &*app.state.db;
    assert_eq!(order::Entity::find().count(db).await.unwrap(), 1);
    assert_eq!(order_status_history::Entity::find().count(db).await.unwrap(), 1);
}

/// Confirmations race on separate connections
async fn pooled_app() -> TestApp {
    TestApp::with_config(|cfg| {
        cfg.db_max_connections = 5;
        cfg.db_min_connections = 5;
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_payments_never_oversell() {
    let app = pooled_app().await;
    let oyster = app.seed_product("Blue Oyster", dec!(9.00), 3).await;

    let mut orders = Vec::new();
    for n in 0..5 {
        let email = format!("buyer{}@example.com", n);
        orders.push(app.place_order(&email, &[(oyster.id, 1)]).await);
    }

    let payments = Arc::new(app.state.payments.clone());
    let handles: Vec<_> = orders
        .iter()
        .enumerate()
        .map(|(n, order_id)| {
            let payments = payments.clone();
            let order_id = order_id.clone();
            tokio::spawn(async move {
                payments
                    .confirm_payment(&order_id, &format!("cs_race_{}", n))
                    .await
            })
        })
        .collect();

    let mut confirmed = 0;
    let mut short = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(ConfirmationOutcome::Confirmed) => confirmed += 1,
            Err(ServiceError::InsufficientStock(_)) => short += 1,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    assert_eq!(confirmed, 3);
    assert_eq!(short, 2);
    assert_eq!(app.stock_of(oyster.id).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redelivery_confirms_once() {
    let app = pooled_app().await;
    let chaga = app.seed_product("Chaga", dec!(15.00), 5).await;
    let order_id = app.place_order("ada@example.com", &[(chaga.id, 2)]).await;

    let a = app.state.payments.clone();
    let b = app.state.payments.clone();
    let (id_a, id_b) = (order_id.clone(), order_id.clone());
    let (first, second) = tokio::join!(
        tokio::spawn(async move { a.confirm_payment(&id_a, "cs_twice").await }),
        tokio::spawn(async move { b.confirm_payment(&id_b, "cs_twice").await }),
    );

    let mut outcomes = vec![first.unwrap().unwrap(), second.unwrap().unwrap()];
    outcomes.sort_by_key(|o| o.to_string());
    assert_eq!(
        outcomes,
        vec![ConfirmationOutcome::Confirmed, ConfirmationOutcome::Duplicate]
    );
    assert_eq!(app.stock_of(chaga.id).await, 3);
}

#[tokio::test]
async fn manual_stock_adjustment_cannot_go_negative() {
    let app = TestApp::new().await;
    let enoki = app.seed_product("Enoki", dec!(6.00), 2).await;

    let result = app.state.catalog.adjust_stock(enoki.id, -3).await;

    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));
    assert_eq!(app.stock_of(enoki.id).await, 2);
}

#[tokio::test]
async fn stock_can_reach_but_not_pass_the_column_maximum() {
    let app = TestApp::new().await;
    let shiitake = app.seed_product("Shiitake", dec!(7.00), 2).await;

    let filled = app
        .state
        .catalog
        .adjust_stock(shiitake.id, i32::MAX - 2)
        .await
        .unwrap();
    assert_eq!(filled.stock_quantity, i32::MAX);

    let result = app.state.catalog.adjust_stock(shiitake.id, 1).await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let result = app.state.catalog.adjust_stock(shiitake.id, i32::MIN).await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let listed = app.state.catalog.list_active(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].stock_quantity, i32::MAX);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_racing_payment_leaves_stock_whole() {
    let app = pooled_app().await;
    let maitake = app.seed_product("Maitake", dec!(14.00), 5).await;
    let order_id = app.place_order("ada@example.com", &[(maitake.id, 2)]).await;

    let payments = app.state.payments.clone();
    let status = app.state.order_status.clone();
    let (pay_id, cancel_id) = (order_id.clone(), order_id.clone());
    let (paid, cancelled) = tokio::join!(
        tokio::spawn(async move { payments.confirm_payment(&pay_id, "cs_vs_cancel").await }),
        tokio::spawn(async move {
            status
                .update_status(&cancel_id, OrderStatus::Cancelled, "admin:admin")
                .await
        }),
    );

    assert_matches!(
        paid.unwrap(),
        Ok(ConfirmationOutcome::Confirmed) | Ok(ConfirmationOutcome::Duplicate)
    );
    assert_eq!(cancelled.unwrap().unwrap().status, OrderStatus::Cancelled);
    assert_eq!(app.stock_of(maitake.id).await, 5);
}
