use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::AppConfig;

/// Tax and shipping rules applied to a cart subtotal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub tax_rate: Decimal,
    /// Shipping is free when the subtotal is strictly above this
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.08),
            free_shipping_threshold: dec!(50.00),
            flat_shipping_rate: dec!(9.99),
        }
    }
}

impl From<&AppConfig> for PricingPolicy {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            tax_rate: cfg.tax_rate,
            free_shipping_threshold: cfg.free_shipping_threshold,
            flat_shipping_rate: cfg.flat_shipping_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl PricingPolicy {
    /// Subtotal of (unit price, quantity) pairs, rounded to cents
    pub fn subtotal<I>(lines: I) -> Decimal
    where
        I: IntoIterator<Item = (Decimal, i32)>,
    {
        round_money(
            lines
                .into_iter()
                .map(|(price, qty)| price * Decimal::from(qty))
                .sum(),
        )
    }

    pub fn quote(&self, subtotal: Decimal) -> PriceBreakdown {
        let subtotal = round_money(subtotal);
        let tax = round_money(subtotal * self.tax_rate);
        let shipping = if subtotal > self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.flat_shipping_rate
        };
        PriceBreakdown {
            subtotal,
            tax,
            shipping,
            total: subtotal + tax + shipping,
        }
    }
}
