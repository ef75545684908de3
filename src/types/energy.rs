use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::number::Number;

const WH_IN_KWH: i64 = 1000;

/// A value of watt hours.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct Wh(Number);

impl Wh {
    pub(crate) fn zero() -> Self {
        Self(Number::default())
    }

    pub(crate) fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub(crate) fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Saturating addition
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Saturating subtraction
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }

    pub(crate) fn kilo_watt_hours(self) -> Number {
        self.0
            .checked_div(Number::from(WH_IN_KWH))
            .unwrap_or_else(|| unreachable!("divisor is non-zero"))
    }
}

impl From<rust_decimal::Decimal> for Wh {
    fn from(value: rust_decimal::Decimal) -> Self {
        Self(value.into())
    }
}

impl From<Wh> for rust_decimal::Decimal {
    fn from(value: Wh) -> Self {
        value.0.into()
    }
}

impl From<Number> for Wh {
    fn from(value: Number) -> Self {
        Self(value)
    }
}

impl From<Wh> for Number {
    fn from(value: Wh) -> Self {
        value.0
    }
}

impl Display for Wh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

/// A value of kilo watt hours.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct Kwh(Number);

impl From<rust_decimal::Decimal> for Kwh {
    fn from(value: rust_decimal::Decimal) -> Self {
        Self(value.into())
    }
}

impl From<Kwh> for rust_decimal::Decimal {
    fn from(value: Kwh) -> Self {
        value.0.into()
    }
}

impl From<Kwh> for Number {
    fn from(value: Kwh) -> Self {
        value.0
    }
}

impl Display for Kwh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}
