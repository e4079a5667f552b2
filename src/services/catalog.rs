use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::{
    db::DbPool,
    entities::product::{self, Entity as Product, ProductCategory},
    errors::ServiceError,
};

/// Catalog entry as exposed over HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: ProductCategory,
    pub strain: Option<String>,
    pub stock_quantity: i32,
    pub image_urls: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        let image_urls = model.image_url_list();
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price.round_dp(2),
            category: model.category,
            strain: model.strain,
            stock_quantity: model.stock_quantity,
            image_urls,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Body for creating or fully replacing a product
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 255, message = "Product name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Product description is required"))]
    pub description: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    pub category: ProductCategory,
    pub strain: Option<String>,
    #[validate(range(min = 0, message = "Stock quantity cannot be negative"))]
    pub stock_quantity: i32,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        let mut err = ValidationError::new("price");
        err.message = Some("Price cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct StockAdjustment {
    /// Signed change applied to stock on hand
    pub delta: i32,
}

#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Active products, newest first, optionally narrowed to one category
    #[instrument(skip(self))]
    pub async fn list_active(
        &self,
        category: Option<ProductCategory>,
    ) -> Result<Vec<ProductResponse>, ServiceError> {
        let mut query = Product::find().filter(product::Column::IsActive.eq(true));
        if let Some(category) = category {
            query = query.filter(product::Column::Category.eq(category));
        }
        let products = query
            .order_by_desc(product::Column::CreatedAt)
            .order_by_desc(product::Column::Id)
            .all(&*self.db_pool)
            .await?;
        Ok(products.into_iter().map(Into::into).collect())
    }

    /// Storefront detail; inactive products are reported as missing
    #[instrument(skip(self))]
    pub async fn get_active(&self, id: i32) -> Result<ProductResponse, ServiceError> {
        Product::find_by_id(id)
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db_pool)
            .await?
            .map(Into::into)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    /// Every product including archived ones, newest first
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<ProductResponse>, ServiceError> {
        let products = Product::find()
            .order_by_desc(product::Column::CreatedAt)
            .order_by_desc(product::Column::Id)
            .all(&*self.db_pool)
            .await?;
        Ok(products.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i32) -> Result<ProductResponse, ServiceError> {
        self.find_model(id).await.map(Into::into)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: ProductInput) -> Result<ProductResponse, ServiceError> {
        input.validate()?;

        let model = product::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            category: Set(input.category),
            strain: Set(input.strain.filter(|s| !s.trim().is_empty())),
            stock_quantity: Set(input.stock_quantity),
            image_urls: Set(serde_json::to_value(input.image_urls)?),
            is_active: Set(input.is_active),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        info!(product_id = model.id, "Product created");
        Ok(model.into())
    }

    /// Full replacement of the editable fields
    #[instrument(skip(self, input))]
    pub async fn update(&self, id: i32, input: ProductInput) -> Result<ProductResponse, ServiceError> {
        input.validate()?;

        let mut active = self.find_model(id).await?.into_active_model();
        active.name = Set(input.name);
        active.description = Set(input.description);
        active.price = Set(input.price);
        active.category = Set(input.category);
        active.strain = Set(input.strain.filter(|s| !s.trim().is_empty()));
        active.stock_quantity = Set(input.stock_quantity);
        active.image_urls = Set(serde_json::to_value(input.image_urls)?);
        active.is_active = Set(input.is_active);

        let model = active.update(&*self.db_pool).await?;
        info!(product_id = id, "Product updated");
        Ok(model.into())
    }

    /// Archives the product; historical order lines keep referencing it
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: i32) -> Result<ProductResponse, ServiceError> {
        let mut active = self.find_model(id).await?.into_active_model();
        active.is_active = Set(false);
        let model = active.update(&*self.db_pool).await?;
        info!(product_id = id, "Product archived");
        Ok(model.into())
    }

    /// Applies `delta` atomically; stock stays within `0..=i32::MAX`
    #[instrument(skip(self))]
    pub async fn adjust_stock(&self, id: i32, delta: i32) -> Result<ProductResponse, ServiceError> {
        let mut update = Product::update_many()
            .col_expr(
                product::Column::StockQuantity,
                Expr::col(product::Column::StockQuantity).add(delta),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(id));
        if delta < 0 {
            let needed = delta.checked_neg().ok_or_else(|| {
                ServiceError::ValidationError(format!("Stock delta {} is out of range", delta))
            })?;
            update = update.filter(product::Column::StockQuantity.gte(needed));
        } else {
            update = update.filter(product::Column::StockQuantity.lte(i32::MAX - delta));
        }

        let result = update.exec(&*self.db_pool).await?;
        if result.rows_affected == 0 {
            // Missing product, or the result would leave the column's range.
            let current = self.find_model(id).await?;
            counter!("mycology.stock.conflicts", 1);
            warn!(
                product_id = id,
                stock = current.stock_quantity,
                delta,
                "Stock adjustment rejected"
            );
            if delta > 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Cannot add {} to stock of {}: {} on hand would exceed the maximum",
                    delta, current.name, current.stock_quantity
                )));
            }
            return Err(ServiceError::InsufficientStock(format!(
                "Cannot adjust stock of {} by {}: only {} on hand",
                current.name, delta, current.stock_quantity
            )));
        }

        info!(product_id = id, delta, "Stock adjusted");
        self.get(id).await
    }

    async fn find_model(&self, id: i32) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input() -> ProductInput {
        ProductInput {
            name: "Blue Oyster".into(),
            description: "Fresh".into(),
            price: dec!(8.50),
            category: ProductCategory::Fresh,
            strain: None,
            stock_quantity: 3,
            image_urls: vec![],
            is_active: true,
        }
    }

    #[test]
    fn rejects_negative_price_and_stock() {
        let mut bad = input();
        bad.price = dec!(-1);
        bad.stock_quantity = -2;
        let errors = bad.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("price"));
        assert!(errors.field_errors().contains_key("stock_quantity"));
    }

    #[test]
    fn is_active_defaults_to_true_when_omitted() {
        let parsed: ProductInput = serde_json::from_value(serde_json::json!({
            "name": "Reishi Tincture",
            "description": "Dual extract",
            "price": "24.99",
            "category": "supplements",
            "stock_quantity": 12
        }))
        .unwrap();
        assert!(parsed.is_active);
        assert!(parsed.image_urls.is_empty());
    }
}
