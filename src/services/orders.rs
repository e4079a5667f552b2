use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        order::{self, Entity as Order, OrderStatus},
        order_item::{self, Entity as OrderItem},
        order_status_history::{self, Entity as OrderStatusHistory},
    },
    errors::ServiceError,
    notifications::OrderSnapshot,
};

/// Structured postal address stored with each order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingAddress {
    #[validate(length(min = 1, message = "Recipient name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Address line 1 is required"))]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    #[serde(alias = "postalCode")]
    pub postal_code: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: i32,
    pub product_id: i32,
    pub product_name: String,
    /// Unit price captured at purchase
    pub price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

impl From<&order_item::Model> for OrderItemResponse {
    fn from(item: &order_item::Model) -> Self {
        let price = item.price.round_dp(2);
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            price,
            quantity: item.quantity,
            line_total: (price * Decimal::from(item.quantity)).round_dp(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: String,
    /// Short customer-facing reference (last 8 characters of the id)
    pub reference: String,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_session_id: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderResponse {
    pub fn from_models(order: order::Model, items: &[order_item::Model]) -> Self {
        Self {
            reference: order.reference(),
            shipping_address: serde_json::from_value(order.shipping_address).ok(),
            id: order.id,
            customer_email: order.customer_email,
            customer_name: order.customer_name,
            total_amount: order.total_amount.round_dp(2),
            status: order.status,
            payment_session_id: order.payment_session_id,
            items: items.iter().map(OrderItemResponse::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusHistoryEntry {
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

impl From<order_status_history::Model> for StatusHistoryEntry {
    fn from(row: order_status_history::Model) -> Self {
        Self {
            from_status: row.from_status,
            to_status: row.to_status,
            actor: row.actor,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub history: Vec<StatusHistoryEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Case-insensitive match on id, customer email or customer name
    pub search: Option<String>,
}

/// Loads the line items of `orders`, grouped by order id
pub(crate) async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_ids: Vec<String>,
) -> Result<HashMap<String, Vec<order_item::Model>>, ServiceError> {
    if order_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.is_in(order_ids))
        .order_by_asc(order_item::Column::Id)
        .all(conn)
        .await?;

    let mut grouped: HashMap<String, Vec<order_item::Model>> = HashMap::new();
    for item in items {
        grouped.entry(item.order_id.clone()).or_default().push(item);
    }
    Ok(grouped)
}

pub(crate) async fn find_order<C: ConnectionTrait>(
    conn: &C,
    order_id: &str,
) -> Result<order::Model, ServiceError> {
    Order::find_by_id(order_id.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

pub(crate) async fn snapshot<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
) -> Result<OrderSnapshot, ServiceError> {
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order.id.clone()))
        .order_by_asc(order_item::Column::Id)
        .all(conn)
        .await?;
    Ok(OrderSnapshot::from_models(order, &items))
}

fn lower_eq(column: impl sea_orm::sea_query::IntoColumnRef, value: &str) -> sea_orm::sea_query::SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).eq(value.trim().to_lowercase())
}

const LIKE_ESCAPE: char = '\\';

/// `%needle%` with the needle's own wildcards matched literally
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn lower_like(column: impl sea_orm::sea_query::IntoColumnRef, pattern: &str) -> sea_orm::sea_query::SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).like(LikeExpr::new(pattern).escape(LIKE_ESCAPE))
}

/// Read side of the order store
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Order with its line items
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: &str) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let order = find_order(db, order_id).await?;
        let mut items = load_items(db, vec![order.id.clone()]).await?;
        let lines = items.remove(&order.id).unwrap_or_default();
        Ok(OrderResponse::from_models(order, &lines))
    }

    /// Order with items and its status audit trail
    #[instrument(skip(self))]
    pub async fn get_order_detail(&self, order_id: &str) -> Result<OrderDetailResponse, ServiceError> {
        let order = self.get_order(order_id).await?;
        let history = self.status_history(order_id).await?;
        Ok(OrderDetailResponse { order, history })
    }

    #[instrument(skip(self))]
    pub async fn status_history(&self, order_id: &str) -> Result<Vec<StatusHistoryEntry>, ServiceError> {
        let rows = OrderStatusHistory::find()
            .filter(order_status_history::Column::OrderId.eq(order_id.to_string()))
            .order_by_asc(order_status_history::Column::Id)
            .all(&*self.db_pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Every order placed with `email`, newest first
    #[instrument(skip(self, email))]
    pub async fn orders_for_email(&self, email: &str) -> Result<Vec<OrderResponse>, ServiceError> {
        if email.trim().is_empty() {
            return Err(ServiceError::ValidationError("Email is required".into()));
        }
        let orders = Order::find()
            .filter(lower_eq(order::Column::CustomerEmail, email))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;
        self.with_items(orders).await
    }

    /// Customer lookup by full id or 8-character reference plus matching email
    #[instrument(skip(self, email))]
    pub async fn track(&self, order_ref: &str, email: &str) -> Result<OrderResponse, ServiceError> {
        let order_ref = order_ref.trim().trim_start_matches('#');
        if order_ref.is_empty() || email.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Order ID and email are required".into(),
            ));
        }

        let id_match = Condition::any()
            .add(lower_eq(order::Column::Id, order_ref))
            .add(lower_like(
                order::Column::Id,
                &format!("%{}", order_ref.to_lowercase()),
            ));
        let mut candidates = Order::find()
            .filter(lower_eq(order::Column::CustomerEmail, email))
            .filter(id_match)
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;

        // A suffix match only counts when it is the full reference.
        candidates.retain(|o| {
            o.id.eq_ignore_ascii_case(order_ref) || o.reference().eq_ignore_ascii_case(order_ref)
        });

        match candidates.into_iter().next() {
            Some(order) => self.get_order(&order.id).await,
            None => Err(ServiceError::NotFound(
                "Order not found. Please check your Order ID and email address.".into(),
            )),
        }
    }

    /// Admin listing, newest first
    #[instrument(skip(self))]
    pub async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<OrderResponse>, ServiceError> {
        let mut query = Order::find();
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = contains_pattern(search);
            query = query.filter(
                Condition::any()
                    .add(lower_like(order::Column::Id, &pattern))
                    .add(lower_like(order::Column::CustomerEmail, &pattern))
                    .add(lower_like(order::Column::CustomerName, &pattern)),
            );
        }
        let orders = query
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;
        self.with_items(orders).await
    }

    #[instrument(skip(self))]
    pub async fn recent_orders(&self, limit: u64) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db_pool)
            .await?;
        self.with_items(orders).await
    }

    /// Pending orders created before `now - older_than`, oldest first
    #[instrument(skip(self))]
    pub async fn list_stale_pending_orders(
        &self,
        older_than: Duration,
        limit: u64,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let cutoff = Utc::now() - older_than;
        let orders = Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .order_by_asc(order::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db_pool)
            .await?;
        self.with_items(orders).await
    }

    async fn with_items(&self, orders: Vec<order::Model>) -> Result<Vec<OrderResponse>, ServiceError> {
        let ids = orders.iter().map(|o| o.id.clone()).collect();
        let mut items = load_items(&*self.db_pool, ids).await?;
        Ok(orders
            .into_iter()
            .map(|order| {
                let lines = items.remove(&order.id).unwrap_or_default();
                OrderResponse::from_models(order, &lines)
            })
            .collect())
    }
}
