use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    db::DbPool,
    entities::{
        order::{self, Entity as Order, OrderStatus},
        product::{self, Entity as Product},
    },
    errors::ServiceError,
    services::{
        catalog::ProductResponse,
        orders::{load_items, OrderResponse, OrderService},
        pricing::round_money,
    },
};

const RECENT_ORDERS: u64 = 10;
const LOW_STOCK_ROWS: u64 = 10;
const TOP_CATEGORIES: usize = 8;
const CATEGORY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MonthlyFigures {
    pub revenue: Decimal,
    pub order_count: u64,
    pub previous_revenue: Decimal,
    pub previous_order_count: u64,
    /// Percent change against the previous month, 0 when it had no revenue
    pub revenue_change_pct: Decimal,
    pub order_change_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CategorySales {
    pub category: String,
    pub order_count: u64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardMetrics {
    pub month: MonthlyFigures,
    pub pending_orders: u64,
    pub active_products: u64,
    pub recent_orders: Vec<OrderResponse>,
    pub low_stock: Vec<ProductResponse>,
    pub category_sales: Vec<CategorySales>,
    pub generated_at: DateTime<Utc>,
}

/// Aggregates for the admin back office
#[derive(Clone)]
pub struct DashboardService {
    db_pool: Arc<DbPool>,
    orders: OrderService,
    low_stock_threshold: i32,
}

impl DashboardService {
    pub fn new(db_pool: Arc<DbPool>, low_stock_threshold: i32) -> Self {
        Self {
            orders: OrderService::new(db_pool.clone()),
            db_pool,
            low_stock_threshold,
        }
    }

    #[instrument(skip(self))]
    pub async fn metrics(&self) -> Result<DashboardMetrics, ServiceError> {
        let now = Utc::now();
        let db = &*self.db_pool;

        let this_month = month_start(now.date_naive())?;
        let last_month = previous_month_start(now.date_naive())?;
        let (revenue, order_count) = self.revenue_between(this_month, now).await?;
        let (previous_revenue, previous_order_count) =
            self.revenue_between(last_month, this_month).await?;

        let pending_orders = Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .count(db)
            .await?;
        let active_products = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .count(db)
            .await?;

        let low_stock = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::StockQuantity.lt(self.low_stock_threshold))
            .order_by_asc(product::Column::StockQuantity)
            .order_by_asc(product::Column::Id)
            .limit(LOW_STOCK_ROWS)
            .all(db)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        let metrics = DashboardMetrics {
            month: MonthlyFigures {
                revenue_change_pct: percent_change(revenue, previous_revenue),
                order_change_pct: percent_change(
                    Decimal::from(order_count),
                    Decimal::from(previous_order_count),
                ),
                revenue,
                order_count,
                previous_revenue,
                previous_order_count,
            },
            pending_orders,
            active_products,
            recent_orders: self.orders.recent_orders(RECENT_ORDERS).await?,
            low_stock,
            category_sales: self
                .category_sales(now - Duration::days(CATEGORY_WINDOW_DAYS))
                .await?,
            generated_at: now,
        };

        info!(
            revenue = %metrics.month.revenue,
            orders = metrics.month.order_count,
            pending = metrics.pending_orders,
            "Dashboard metrics generated"
        );
        Ok(metrics)
    }

    /// Revenue and order count for non-cancelled orders in `[from, to)`
    async fn revenue_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(Decimal, u64), ServiceError> {
        let totals: Vec<Decimal> = Order::find()
            .select_only()
            .column(order::Column::TotalAmount)
            .filter(order::Column::CreatedAt.gte(from))
            .filter(order::Column::CreatedAt.lt(to))
            .filter(order::Column::Status.ne(OrderStatus::Cancelled))
            .into_tuple()
            .all(&*self.db_pool)
            .await?;
        let count = totals.len() as u64;
        Ok((round_money(totals.into_iter().sum()), count))
    }

    async fn category_sales(&self, since: DateTime<Utc>) -> Result<Vec<CategorySales>, ServiceError> {
        let db = &*self.db_pool;
        let order_ids: Vec<String> = Order::find()
            .select_only()
            .column(order::Column::Id)
            .filter(order::Column::CreatedAt.gte(since))
            .filter(order::Column::Status.ne(OrderStatus::Cancelled))
            .into_tuple()
            .all(db)
            .await?;

        let items: Vec<_> = load_items(db, order_ids).await?.into_values().flatten().collect();
        let product_ids: HashSet<i32> = items.iter().map(|i| i.product_id).collect();
        let categories: HashMap<i32, String> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.category.to_string()))
            .collect();

        let mut acc: HashMap<String, (HashSet<String>, Decimal)> = HashMap::new();
        for item in items {
            let category = categories
                .get(&item.product_id)
                .cloned()
                .unwrap_or_else(|| "uncategorized".to_string());
            let entry = acc.entry(category).or_default();
            entry.1 += item.price * Decimal::from(item.quantity);
            entry.0.insert(item.order_id);
        }

        Ok(rank_categories(acc))
    }
}

fn rank_categories(acc: HashMap<String, (HashSet<String>, Decimal)>) -> Vec<CategorySales> {
    let mut sales: Vec<CategorySales> = acc
        .into_iter()
        .map(|(category, (orders, revenue))| CategorySales {
            category,
            order_count: orders.len() as u64,
            revenue: round_money(revenue),
        })
        .collect();
    sales.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.category.cmp(&b.category)));
    sales.truncate(TOP_CATEGORIES);
    sales
}

fn percent_change(current: Decimal, previous: Decimal) -> Decimal {
    if previous.is_zero() {
        return Decimal::ZERO;
    }
    ((current - previous) / previous * Decimal::ONE_HUNDRED).round_dp(2)
}

fn month_start(day: NaiveDate) -> Result<DateTime<Utc>, ServiceError> {
    day.with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| ServiceError::InternalError(format!("no month start for {}", day)))
}

fn previous_month_start(day: NaiveDate) -> Result<DateTime<Utc>, ServiceError> {
    let (year, month) = if day.month() == 1 {
        (day.year() - 1, 12)
    } else {
        (day.year(), day.month() - 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ServiceError::InternalError(format!("no previous month for {}", day)))
        .and_then(month_start)
}
