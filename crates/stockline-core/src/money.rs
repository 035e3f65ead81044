//! # Money
//!
//! Amounts that change hands at the till: unit prices, line totals, the
//! sale header. Everything else that carries value (unit costs of stock
//! batches, per-base-unit prices after a conversion) stays `Decimal`.
//!
//! ## Where Rounding Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  i64 cents on both sides of every `+` and `−`, so sums are exact.       │
//! │                                                                         │
//! │  Decimal enters only through multiplication:                            │
//! │    unit price × 0.25 kg   ──► checked_mul_quantity ──► HALF_UP, 1 time  │
//! │    taxable    × 16%       ──► calculate_tax        ──► HALF_UP, 1 time  │
//! │                                                                         │
//! │  HALF_UP here is "midpoint away from zero": 112.5¢ → 113¢.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ```rust
//! use stockline_core::money::Money;
//!
//! let cola = Money::from_cents(150);
//! let basket = cola * 4 + Money::from_cents(260);
//! assert_eq!(basket.to_string(), "$8.60");
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};
use ts_rs::TS;

use crate::types::TaxRate;

/// A signed amount in cents.
///
/// Serialized as the bare integer so the TypeScript side sees `number`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub const fn zero() -> Self {
        Money(0)
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `None` when the sum leaves the i64 range.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Tax on this amount, rounded half-up to the cent.
    ///
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use stockline_core::money::Money;
    /// use stockline_core::types::TaxRate;
    ///
    /// // $80.00 at 16% = $12.80
    /// let rate = TaxRate::new(Decimal::new(16, 2)).unwrap();
    /// assert_eq!(Money::from_cents(8_000).calculate_tax(rate).cents(), 1_280);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        let tax = (Decimal::from(self.0) * rate.fraction())
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        // rate is within 0..=1, so |tax| <= |self|
        Money(tax.to_i64().unwrap_or(self.0))
    }

    /// Price per selling unit times a possibly fractional quantity.
    ///
    /// Returns `None` if the line total does not fit in i64 cents.
    ///
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use stockline_core::money::Money;
    ///
    /// // 0.25 kg at $4.50/kg = $1.125 → $1.13
    /// let line = Money::from_cents(450).checked_mul_quantity(Decimal::new(25, 2));
    /// assert_eq!(line, Some(Money::from_cents(113)));
    /// ```
    pub fn checked_mul_quantity(&self, quantity: Decimal) -> Option<Money> {
        Decimal::from(self.0)
            .checked_mul(quantity)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Money)
    }
}

/// `$12.80`, `-$0.05`. For logs, receipts and error messages.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, quantity: i64) -> Self {
        Money(self.0 * quantity)
    }
}
