use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{begin_write, DbPool},
    entities::{
        order::{self, OrderStatus},
        order_item, order_status_history,
        product::{self, Entity as Product},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{to_minor_units, GatewayLineItem, PaymentGateway, SessionRequest},
    services::{
        orders::{find_order, load_items, OrderResponse, ShippingAddress},
        pricing::{PriceBreakdown, PricingPolicy},
    },
};

/// One requested cart line. `price` is what the client displayed and is
/// never trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutLine {
    #[serde(alias = "productId")]
    pub product_id: i32,
    pub quantity: i32,
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderRequest {
    #[validate(email(message = "A valid email address is required"))]
    #[serde(alias = "customerEmail")]
    pub customer_email: String,
    #[serde(default, alias = "customerName")]
    pub customer_name: Option<String>,
    #[validate]
    #[serde(alias = "shippingAddress")]
    pub shipping_address: ShippingAddress,
    #[validate(length(min = 1, message = "Cart is empty"))]
    pub items: Vec<CheckoutLine>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlacedOrderResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub pricing: PriceBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSessionResponse {
    pub order_id: String,
    pub session_id: String,
    pub checkout_url: String,
}

/// Settings the orchestrator needs from configuration
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub public_base_url: String,
    pub currency: String,
    pub pricing: PricingPolicy,
}

struct PricedLine {
    product: product::Model,
    quantity: i32,
}

#[derive(Clone)]
pub struct CheckoutService {
    db_pool: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            db_pool,
            gateway,
            event_sender,
            settings,
        }
    }

    /// Creates a pending order from a cart. Lines are re-priced from the
    /// catalog; the order row, its items and the first history row are
    /// written in one transaction.
    #[instrument(skip(self, request), fields(customer_email = %request.customer_email, lines = request.items.len()))]
    pub async fn place_order(&self, request: PlaceOrderRequest) -> Result<PlacedOrderResponse, ServiceError> {
        request.validate()?;
        let lines = merge_lines(&request.items)?;

        let txn = begin_write(&self.db_pool).await?;
        let priced = price_lines(&txn, &lines).await?;

        let subtotal = PricingPolicy::subtotal(priced.iter().map(|l| (l.product.price, l.quantity)));
        let pricing = self.settings.pricing.quote(subtotal);
        let order_id = Uuid::new_v4().to_string();

        let inserted = insert_order(&txn, &order_id, &request, &priced, pricing.total).await;
        let (order, items) = match inserted {
            Ok(rows) => rows,
            Err(e) => {
                error!(order_id = %order_id, error = %e, "Order creation failed; rolling back");
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "Rollback after failed order creation also failed");
                }
                counter!("mycology.orders.creation_failed", 1);
                return Err(ServiceError::CreationError(e.to_string()));
            }
        };
        txn.commit().await?;

        counter!("mycology.orders.created", 1);
        info!(order_id = %order.id, total = %pricing.total, "Order placed");
        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id: order.id.clone(),
            })
            .await;

        Ok(PlacedOrderResponse {
            order: OrderResponse::from_models(order, &items),
            pricing,
        })
    }

    /// Requests a hosted payment session for a pending order. Safe to call
    /// again after a gateway failure.
    #[instrument(skip(self))]
    pub async fn start_payment_session(&self, order_id: &str) -> Result<CheckoutSessionResponse, ServiceError> {
        let db = &*self.db_pool;
        let order = find_order(db, order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::Conflict(format!(
                "Order {} is {} and no longer awaiting payment",
                order.reference(),
                order.status
            )));
        }

        let items = load_items(db, vec![order.id.clone()])
            .await?
            .remove(&order.id)
            .unwrap_or_default();
        if items.is_empty() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} has no items",
                order.reference()
            )));
        }

        let categories: HashMap<i32, String> = Product::find()
            .filter(product::Column::Id.is_in(items.iter().map(|i| i.product_id).collect::<Vec<_>>()))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.category.to_string()))
            .collect();

        let request = self.session_request(&order, &items, &categories)?;
        let session = match self.gateway.create_session(request).await {
            Ok(session) => session,
            Err(e) => {
                counter!("mycology.payments.session_failed", 1);
                warn!(order_id = %order.id, error = %e, "Payment session creation failed; order stays pending");
                return Err(e.into());
            }
        };

        info!(order_id = %order.id, session_id = %session.id, "Payment session ready");
        Ok(CheckoutSessionResponse {
            order_id: order.id,
            session_id: session.id,
            checkout_url: session.url,
        })
    }

    fn session_request(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
        categories: &HashMap<i32, String>,
    ) -> Result<SessionRequest, ServiceError> {
        let minor = |amount: Decimal| {
            to_minor_units(amount).ok_or_else(|| {
                ServiceError::InternalError(format!("amount {} out of range", amount))
            })
        };

        let mut line_items = Vec::with_capacity(items.len() + 2);
        for item in items {
            line_items.push(GatewayLineItem {
                name: item.product_name.clone(),
                description: categories.get(&item.product_id).cloned(),
                unit_amount: minor(item.price)?,
                quantity: i64::from(item.quantity),
            });
        }

        let subtotal = PricingPolicy::subtotal(items.iter().map(|i| (i.price, i.quantity)));
        let quote = self.settings.pricing.quote(subtotal);
        let total = order.total_amount.round_dp(2);
        if quote.total != total {
            warn!(
                order_id = %order.id,
                stored = %total,
                recomputed = %quote.total,
                "Pricing policy changed since order creation; charging stored total"
            );
        }
        // The stored total is authoritative; shipping absorbs any policy drift.
        let tax = quote.tax.min(total - subtotal).max(Decimal::ZERO);
        let shipping = (total - subtotal - tax).max(Decimal::ZERO);

        for (name, amount) in [("Tax", tax), ("Shipping", shipping)] {
            if amount > Decimal::ZERO {
                line_items.push(GatewayLineItem {
                    name: name.to_string(),
                    description: None,
                    unit_amount: minor(amount)?,
                    quantity: 1,
                });
            }
        }

        let base = self.settings.public_base_url.trim_end_matches('/');
        Ok(SessionRequest {
            order_id: order.id.clone(),
            customer_email: order.customer_email.clone(),
            currency: self.settings.currency.clone(),
            line_items,
            success_url: format!(
                "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}&order_id={}",
                base, order.id
            ),
            cancel_url: format!("{}/checkout/cancel", base),
        })
    }
}

/// Folds repeated products into one line and rejects non-positive quantities
fn merge_lines(lines: &[CheckoutLine]) -> Result<Vec<(i32, i32)>, ServiceError> {
    let mut merged: Vec<(i32, i32)> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for product {} must be at least 1",
                line.product_id
            )));
        }
        match merged.iter_mut().find(|(id, _)| *id == line.product_id) {
            Some((_, qty)) => {
                *qty = qty.checked_add(line.quantity).ok_or_else(|| {
                    ServiceError::ValidationError("Quantity is too large".into())
                })?
            }
            None => merged.push((line.product_id, line.quantity)),
        }
    }
    Ok(merged)
}

async fn price_lines(txn: &DatabaseTransaction, lines: &[(i32, i32)]) -> Result<Vec<PricedLine>, ServiceError> {
    let ids: Vec<i32> = lines.iter().map(|(id, _)| *id).collect();
    let mut products: HashMap<i32, product::Model> = Product::find()
        .filter(product::Column::Id.is_in(ids))
        .all(txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut priced = Vec::with_capacity(lines.len());
    for (product_id, quantity) in lines {
        let product = products
            .remove(product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("Product {} is not available", product_id))
            })?;
        if *quantity > product.stock_quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Only {} of {} left in stock",
                product.stock_quantity, product.name
            )));
        }
        priced.push(PricedLine {
            product,
            quantity: *quantity,
        });
    }
    Ok(priced)
}

async fn insert_order(
    txn: &DatabaseTransaction,
    order_id: &str,
    request: &PlaceOrderRequest,
    lines: &[PricedLine],
    total: Decimal,
) -> Result<(order::Model, Vec<order_item::Model>), DbErr> {
    let shipping_address = serde_json::to_value(&request.shipping_address)
        .map_err(|e| DbErr::Custom(e.to_string()))?;

    let order = order::ActiveModel {
        id: Set(order_id.to_string()),
        customer_email: Set(request.customer_email.trim().to_string()),
        customer_name: Set(request
            .customer_name
            .as_ref()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())),
        shipping_address: Set(shipping_address),
        total_amount: Set(total),
        status: Set(OrderStatus::Pending),
        payment_session_id: Set(None),
        payment_idempotency_key: Set(None),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        if let Some(asserted) = request
            .items
            .iter()
            .find(|l| l.product_id == line.product.id)
            .and_then(|l| l.price)
        {
            if asserted.round_dp(2) != line.product.price.round_dp(2) {
                debug!(
                    product_id = line.product.id,
                    asserted = %asserted,
                    catalog = %line.product.price,
                    "Client price differs from catalog; using catalog price"
                );
            }
        }

        let item = order_item::ActiveModel {
            order_id: Set(order.id.clone()),
            product_id: Set(line.product.id),
            product_name: Set(line.product.name.clone()),
            price: Set(line.product.price),
            quantity: Set(line.quantity),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        items.push(item);
    }

    order_status_history::ActiveModel {
        order_id: Set(order.id.clone()),
        from_status: Set(None),
        to_status: Set(OrderStatus::Pending),
        actor: Set("customer".to_string()),
        created_at: Set(order.created_at),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    Ok((order, items))
}
