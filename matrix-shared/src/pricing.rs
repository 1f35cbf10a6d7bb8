//! Cart totals, platform fees and seller earnings
//!
//! All money is [`Decimal`], rounded to cents with midpoint-away-from-zero
//! rounding.
//!
//! # Example
//!
//! ```
//! use matrix_shared::pricing::{CartLine, CartSummary};
//! use rust_decimal::Decimal;
//!
//! let summary = CartSummary::from_lines(&[CartLine {
//!     price: Decimal::new(2000, 2),
//!     quantity: 2,
//! }]);
//!
//! assert_eq!(summary.subtotal, Decimal::new(4000, 2));
//! assert_eq!(summary.tax, Decimal::new(400, 2));
//! assert_eq!(summary.total, Decimal::new(5400, 2));
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Flat shipping charge for a non-empty cart
pub const SHIPPING_FLAT: Decimal = Decimal::from_parts(1000, 0, 0, false, 2);

/// Sales tax applied to the subtotal
pub const TAX_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Share of each completed sale kept by the platform
pub const PLATFORM_FEE_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Rounds to cents, midpoint away from zero
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// One priced line in a cart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    pub price: Decimal,
    pub quantity: i32,
}

/// Totals shown under a cart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub item_count: i64,
}

impl CartSummary {
    /// Computes cart totals
    ///
    /// `subtotal = Σ price × quantity`, `tax = subtotal × 10%`, flat shipping
    /// of 10.00, `total = subtotal + shipping + tax`. An empty cart costs
    /// nothing, shipping included.
    pub fn from_lines(lines: &[CartLine]) -> Self {
        let item_count: i64 = lines.iter().map(|l| i64::from(l.quantity.max(0))).sum();

        if item_count == 0 {
            return Self {
                subtotal: Decimal::ZERO,
                shipping: Decimal::ZERO,
                tax: Decimal::ZERO,
                total: Decimal::ZERO,
                item_count: 0,
            };
        }

        let subtotal = round_money(
            lines
                .iter()
                .map(|l| l.price * Decimal::from(l.quantity.max(0)))
                .sum(),
        );
        let tax = round_money(subtotal * TAX_RATE);
        let shipping = SHIPPING_FLAT;

        Self {
            subtotal,
            shipping,
            tax,
            total: round_money(subtotal + shipping + tax),
            item_count,
        }
    }
}

/// Platform fee on a seller's revenue
pub fn platform_fee(revenue: Decimal) -> Decimal {
    round_money(revenue * PLATFORM_FEE_RATE)
}

/// What the seller keeps from `revenue` after the platform fee
pub fn seller_earnings(revenue: Decimal) -> Decimal {
    round_money(revenue - platform_fee(revenue))
}

/// Line total for an order item
pub fn line_total(price: Decimal, quantity: i32) -> Decimal {
    round_money(price * Decimal::from(quantity))
}

/// Money as a float for the analytics models
pub fn as_f64(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or(0.0)
}
