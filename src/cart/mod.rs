//! Client-held shopping cart.
//!
//! The cart is purchase intent only: prices shown here are a snapshot for
//! display, and checkout re-prices every line from the catalog.

pub mod storage;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::entities::product::{self, ProductCategory};
use crate::services::checkout::CheckoutLine;

pub use storage::{CartStorage, FileCartStorage, MemoryCartStorage};

/// Storage key the cart lives under
pub const CART_STORAGE_KEY: &str = "mycology-cart";

#[derive(Debug, Error)]
pub enum CartError {
    #[error("cart storage error: {0}")]
    Storage(String),
    #[error("cart serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Display copy of a product at the time it was added
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartProduct {
    pub id: i32,
    pub name: String,
    pub price: Decimal,
    pub category: ProductCategory,
    pub image_url: Option<String>,
}

impl From<&product::Model> for CartProduct {
    fn from(model: &product::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            price: model.price.round_dp(2),
            category: model.category,
            image_url: model.image_url_list().into_iter().next(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: CartProduct,
    pub quantity: u32,
}

pub struct Cart<S: CartStorage> {
    storage: S,
    lines: Vec<CartLine>,
}

impl<S: CartStorage> Cart<S> {
    /// Rehydrates from storage. A corrupt saved cart is logged and dropped.
    pub fn load(storage: S) -> Result<Self, CartError> {
        let lines = match storage.load(CART_STORAGE_KEY)? {
            Some(raw) => serde_json::from_str::<Vec<CartLine>>(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring unreadable saved cart");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Ok(Self { storage, lines })
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Adds `quantity` units, merging with an existing line for the same product
    pub fn add_item(&mut self, product: CartProduct, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Ok(());
        }
        match self.lines.iter_mut().find(|l| l.product.id == product.id) {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => self.lines.push(CartLine { product, quantity }),
        }
        self.persist()
    }

    /// Removing an absent product is not an error
    pub fn remove_item(&mut self, product_id: i32) -> Result<(), CartError> {
        self.lines.retain(|l| l.product.id != product_id);
        self.persist()
    }

    /// A quantity of zero or less removes the line
    pub fn set_quantity(&mut self, product_id: i32, quantity: i64) -> Result<(), CartError> {
        if quantity <= 0 {
            return self.remove_item(product_id);
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(line) = self.lines.iter_mut().find(|l| l.product.id == product_id) {
            line.quantity = quantity;
        }
        self.persist()
    }

    pub fn clear(&mut self) -> Result<(), CartError> {
        self.lines.clear();
        self.persist()
    }

    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Σ price × quantity, rounded to cents
    pub fn subtotal(&self) -> Decimal {
        self.lines
            .iter()
            .map(|l| l.product.price * Decimal::from(l.quantity))
            .sum::<Decimal>()
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Lines as submitted to `POST /orders`
    pub fn checkout_lines(&self) -> Vec<CheckoutLine> {
        self.lines
            .iter()
            .map(|l| CheckoutLine {
                product_id: l.product.id,
                quantity: i32::try_from(l.quantity).unwrap_or(i32::MAX),
                price: Some(l.product.price),
            })
            .collect()
    }

    fn persist(&self) -> Result<(), CartError> {
        let raw = serde_json::to_string(&self.lines)?;
        self.storage.save(CART_STORAGE_KEY, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(id: i32, price: Decimal) -> CartProduct {
        CartProduct {
            id,
            name: format!("Mushroom {}", id),
            price,
            category: ProductCategory::Fresh,
            image_url: None,
        }
    }

    #[test]
    fn add_merges_same_product_and_totals_follow() {
        let mut cart = Cart::load(MemoryCartStorage::new()).unwrap();
        cart.add_item(product(1, dec!(12.00)), 1).unwrap();
        cart.add_item(product(1, dec!(12.00)), 1).unwrap();
        cart.add_item(product(2, dec!(3.335)), 3).unwrap();

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.item_count(), 5);
        assert_eq!(cart.subtotal(), dec!(34.01));
    }

    #[test]
    fn set_quantity_to_zero_removes_line() {
        let mut cart = Cart::load(MemoryCartStorage::new()).unwrap();
        cart.add_item(product(1, dec!(5)), 2).unwrap();
        cart.set_quantity(1, 4).unwrap();
        assert_eq!(cart.item_count(), 4);
        cart.set_quantity(1, 0).unwrap();
        assert!(cart.is_empty());
        cart.remove_item(99).unwrap();
    }

    #[test]
    fn every_mutation_is_persisted_and_rehydrated() {
        let storage = MemoryCartStorage::new();
        {
            let mut cart = Cart::load(storage.clone()).unwrap();
            cart.add_item(product(7, dec!(19.99)), 2).unwrap();
        }
        let cart = Cart::load(storage.clone()).unwrap();
        assert_eq!(cart.item_count(), 2);
        assert_eq!(cart.subtotal(), dec!(39.98));

        let mut cart = cart;
        cart.clear().unwrap();
        assert!(Cart::load(storage).unwrap().is_empty());
    }

    #[test]
    fn corrupt_saved_cart_starts_empty() {
        let storage = MemoryCartStorage::new();
        storage.save(CART_STORAGE_KEY, "{not json").unwrap();
        let cart = Cart::load(storage).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn file_storage_round_trips_under_cart_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut cart = Cart::load(FileCartStorage::new(dir.path())).unwrap();
        cart.add_item(product(3, dec!(8.50)), 1).unwrap();
        assert!(dir.path().join("mycology-cart.json").exists());

        let reloaded = Cart::load(FileCartStorage::new(dir.path())).unwrap();
        assert_eq!(reloaded.lines(), cart.lines());
    }

    #[test]
    fn checkout_lines_carry_ids_and_quantities() {
        let mut cart = Cart::load(MemoryCartStorage::new()).unwrap();
        cart.add_item(product(4, dec!(2.50)), 3).unwrap();
        let lines = cart.checkout_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, 4);
        assert_eq!(lines[0].quantity, 3);
    }
}
