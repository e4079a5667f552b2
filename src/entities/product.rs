use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Catalog product
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    /// Unit price, never negative
    pub price: Decimal,

    pub category: ProductCategory,

    /// Optional strain label (e.g. "Lion's Mane")
    pub strain: Option<String>,

    /// Units on hand, never negative
    pub stock_quantity: i32,

    /// JSON array of image URLs
    #[sea_orm(column_type = "Json")]
    pub image_urls: Json,

    /// Soft-delete marker; inactive products are hidden from the storefront
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Image URLs as a list; malformed stored values read as empty
    pub fn image_url_list(&self) -> Vec<String> {
        serde_json::from_value(self.image_urls.clone()).unwrap_or_default()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProductCategory {
    #[sea_orm(string_value = "fresh")]
    Fresh,
    #[sea_orm(string_value = "kits")]
    Kits,
    #[sea_orm(string_value = "supplements")]
    Supplements,
    #[sea_orm(string_value = "dried")]
    Dried,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.is_active {
                active_model.is_active = Set(true);
            }
            if let ActiveValue::NotSet = active_model.image_urls {
                active_model.image_urls = Set(Json::Array(Vec::new()));
            }
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        if let ActiveValue::Set(price) | ActiveValue::Unchanged(price) = &active_model.price {
            if price.is_sign_negative() {
                return Err(DbErr::Custom("Product price cannot be negative".to_string()));
            }
        }
        if let ActiveValue::Set(stock) | ActiveValue::Unchanged(stock) =
            &active_model.stock_quantity
        {
            if *stock < 0 {
                return Err(DbErr::Custom(
                    "Product stock cannot be negative".to_string(),
                ));
            }
        }

        Ok(active_model)
    }
}
