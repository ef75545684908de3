use std::{
    fmt::Display,
    ops::{Add, Mul},
};

use serde::{Deserialize, Serialize};

use super::number::Number;

/// A monetary amount, the currency is dependant on the specified tariff.
///
/// Amounts are kept at full decimal precision; use [`Money::truncated`] for
/// the two decimal form that is safe to display and sum.
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Money(Number);

impl Money {
    pub(crate) fn zero() -> Self {
        Self(Number::default())
    }

    /// Truncate, never round to nearest, to two decimal places. Truncation
    /// guarantees that already-displayed per-dimension amounts never sum to
    /// more than the precisely computed grand total.
    #[must_use]
    pub fn truncated(self) -> Self {
        Self(self.0.truncated())
    }

    /// Saturating addition
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Mul<Number> for Money {
    type Output = Money;

    fn mul(self, rhs: Number) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Mul<Money> for Number {
    type Output = Money;

    fn mul(self, rhs: Money) -> Self::Output {
        Money(rhs.0 * self)
    }
}

impl From<rust_decimal::Decimal> for Money {
    fn from(value: rust_decimal::Decimal) -> Self {
        Self(value.into())
    }
}

impl From<Money> for Number {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}
