//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Profit is computed per line: (sale - bought) × quantity                │
//! │                                                                         │
//! │  With floats:  (0.30 - 0.10) × 3 = 0.6000000000000001                  │
//! │  With cents:   (30 - 10) × 3     = 60                                   │
//! │                                                                         │
//! │  Every amount in the database, API and reports is an i64 in the        │
//! │  smallest currency unit. Only the frontend formats for display.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kassa_core::money::Money;
//!
//! let price = Money::from_cents(1099);
//! let line = price.multiply_quantity(2);
//! assert_eq!(line.cents(), 2198);
//! assert_eq!(line.format_with("USD"), "21.98 USD");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

/// A monetary value in the smallest currency unit ("cents").
///
/// Signed so that refunds and negative margins (selling below cost) are
/// representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion (truncated toward zero).
    #[inline]
    pub const fn whole(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the fractional portion, always 0-99.
    #[inline]
    pub const fn fraction(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a line quantity, saturating at the `i64` bounds.
    ///
    /// Checkout uses [`Money::checked_multiply`] instead so an overflow is
    /// an error rather than a clamped total.
    ///
    /// ```rust
    /// use kassa_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(299).multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    pub fn checked_multiply(&self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(Money)
    }

    pub fn checked_add(&self, other: Money) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(&self, other: Money) -> Option<Self> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Formats the amount followed by an ISO currency code, e.g. `"12.50 USD"`.
    ///
    /// Used in SMS reminders, where the frontend cannot format for us.
    pub fn format_with(&self, currency: &str) -> String {
        format!("{} {}", self, currency)
    }
}

/// Plain decimal rendering without a currency symbol: `-5.50`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.whole().abs(), self.fraction())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

// Operators saturate. Checkout totals go through the checked_* methods.

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts() {
        let money = Money::from_cents(1099);
        assert_eq!(money.whole(), 10);
        assert_eq!(money.fraction(), 99);

        let negative = Money::from_cents(-550);
        assert_eq!(negative.whole(), -5);
        assert_eq!(negative.fraction(), 50);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_format_with_currency() {
        assert_eq!(Money::from_cents(125_000).format_with("KGS"), "1250.00 KGS");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);

        let huge: Money = vec![Money::from_cents(i64::MAX), a].into_iter().sum();
        assert_eq!(huge.cents(), i64::MAX);
        assert_eq!((Money::from_cents(i64::MIN) - a).cents(), i64::MIN);
    }

    #[test]
    fn test_negative_margin_is_representable() {
        let sale = Money::from_cents(90);
        let bought = Money::from_cents(100);
        let profit = (sale - bought).multiply_quantity(4);
        assert_eq!(profit.cents(), -40);
        assert!(profit.is_negative());
    }

    #[test]
    fn test_checked_multiply_overflow() {
        assert!(Money::from_cents(i64::MAX).checked_multiply(2).is_none());
        assert_eq!(Money::from_cents(7).checked_multiply(6), Some(Money::from_cents(42)));
        assert_eq!(Money::from_cents(i64::MAX).multiply_quantity(2).cents(), i64::MAX);
    }

    #[test]
    fn test_checked_add_and_sub() {
        assert!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)).is_none());
        assert!(Money::from_cents(i64::MIN).checked_sub(Money::from_cents(1)).is_none());
        assert_eq!(
            Money::from_cents(150).checked_sub(Money::from_cents(200)),
            Some(Money::from_cents(-50))
        );
    }
}
