use chrono::Utc;
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    Set,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    db::{begin_write, DbPool},
    entities::{
        order::{self, Entity as Order, OrderStatus},
        order_item::{self, Entity as OrderItem},
        order_status_history,
        product::{self, Entity as Product},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::{find_order, snapshot, OrderResponse, OrderService},
};

fn rank(status: OrderStatus) -> Option<u8> {
    match status {
        OrderStatus::Pending => Some(0),
        OrderStatus::Processing => Some(1),
        OrderStatus::Shipped => Some(2),
        OrderStatus::Delivered => Some(3),
        OrderStatus::Cancelled => None,
    }
}

pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Delivered | OrderStatus::Cancelled)
}

/// Forward-only lifecycle with `cancelled` reachable from any live state
pub fn transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    if is_terminal(from) {
        return false;
    }
    match (rank(from), rank(to)) {
        (_, None) => true,
        (Some(current), Some(target)) => target > current,
        (None, Some(_)) => false,
    }
}

fn consumes_stock(from: OrderStatus, to: OrderStatus) -> bool {
    from == OrderStatus::Pending && !matches!(to, OrderStatus::Pending | OrderStatus::Cancelled)
}

fn releases_stock(from: OrderStatus, to: OrderStatus) -> bool {
    from == OrderStatus::Processing && to == OrderStatus::Cancelled
}

/// Payment facts recorded together with the pending → processing move
pub(crate) struct PaymentMark<'a> {
    pub session_id: &'a str,
    pub idempotency_key: &'a str,
}

/// Moves `order` to `to` inside `txn`: compare-and-set on the prior status,
/// stock consumption or release, and an audit row.
pub(crate) async fn apply_transition(
    txn: &DatabaseTransaction,
    order: &order::Model,
    to: OrderStatus,
    actor: &str,
    payment: Option<PaymentMark<'_>>,
) -> Result<order::Model, ServiceError> {
    let from = order.status;
    let now = Utc::now();

    let mut update = Order::update_many()
        .col_expr(order::Column::Status, Expr::value(to))
        .col_expr(order::Column::UpdatedAt, Expr::value(now));
    if let Some(mark) = &payment {
        update = update
            .col_expr(
                order::Column::PaymentSessionId,
                Expr::value(mark.session_id.to_string()),
            )
            .col_expr(
                order::Column::PaymentIdempotencyKey,
                Expr::value(mark.idempotency_key.to_string()),
            );
    }
    let result = update
        .filter(order::Column::Id.eq(order.id.clone()))
        .filter(order::Column::Status.eq(from))
        .exec(txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Order {} was modified concurrently; expected status {}",
            order.id, from
        )));
    }

    if consumes_stock(from, to) || releases_stock(from, to) {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id.clone()))
            .all(txn)
            .await?;
        for item in &items {
            if consumes_stock(from, to) {
                decrement_stock(txn, item).await?;
            } else {
                restock(txn, item).await?;
            }
        }
    }

    order_status_history::ActiveModel {
        order_id: Set(order.id.clone()),
        from_status: Set(Some(from)),
        to_status: Set(to),
        actor: Set(actor.to_string()),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    let mut updated = order.clone();
    updated.status = to;
    updated.updated_at = now;
    if let Some(mark) = payment {
        updated.payment_session_id = Some(mark.session_id.to_string());
        updated.payment_idempotency_key = Some(mark.idempotency_key.to_string());
    }
    Ok(updated)
}

async fn decrement_stock<C: ConnectionTrait>(
    conn: &C,
    item: &order_item::Model,
) -> Result<(), ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).sub(item.quantity),
        )
        .filter(product::Column::Id.eq(item.product_id))
        .filter(product::Column::StockQuantity.gte(item.quantity))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        counter!("mycology.stock.conflicts", 1);
        warn!(
            order_id = %item.order_id,
            product_id = item.product_id,
            quantity = item.quantity,
            "Insufficient stock to confirm order"
        );
        return Err(ServiceError::InsufficientStock(format!(
            "Not enough stock for {} (requested {})",
            item.product_name, item.quantity
        )));
    }
    Ok(())
}

async fn restock<C: ConnectionTrait>(conn: &C, item: &order_item::Model) -> Result<(), ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).add(item.quantity),
        )
        .filter(product::Column::Id.eq(item.product_id))
        .filter(product::Column::StockQuantity.lte(i32::MAX - item.quantity))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        // Only reachable when the count was raised to the column maximum meanwhile.
        return Err(ServiceError::Conflict(format!(
            "Cannot return {} units of {} to stock",
            item.quantity, item.product_name
        )));
    }
    Ok(())
}

/// Operator-driven status changes
#[derive(Clone)]
pub struct OrderStatusService {
    db_pool: Arc<DbPool>,
    orders: OrderService,
    event_sender: EventSender,
}

impl OrderStatusService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            orders: OrderService::new(db_pool.clone()),
            db_pool,
            event_sender,
        }
    }

    /// Applies `new_status` if the lifecycle allows it. Re-setting the current
    /// status succeeds without side effects.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        actor: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = begin_write(&self.db_pool).await?;
        let order = find_order(&txn, order_id).await?;
        let old_status = order.status;

        if old_status == new_status {
            txn.commit().await?;
            return self.orders.get_order(order_id).await;
        }

        if !transition_allowed(old_status, new_status) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot change order status from '{}' to '{}'",
                old_status, new_status
            )));
        }

        let updated = apply_transition(&txn, &order, new_status, actor, None).await?;
        let snapshot = snapshot(&txn, &updated).await?;
        txn.commit().await?;

        counter!("mycology.orders.status_changes", 1);
        info!(old_status = %old_status, actor, "Order status updated");

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order: snapshot,
                old_status,
                new_status,
            })
            .await;

        self.orders.get_order(order_id).await
    }
}
