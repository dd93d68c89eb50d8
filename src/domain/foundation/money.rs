//! Money and currency value objects.
//!
//! Amounts are kept in major units (dollars) as exact decimals. Payment
//! providers speak minor units (cents); conversion rounds half away from
//! zero, so `10.005` becomes `1001` cents.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use super::ValidationError;

/// Number of minor units in one major unit.
const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Decimal places kept for a two-decimal currency.
const MINOR_UNIT_SCALE: u32 = 2;

/// A currency amount in major units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero amount.
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Wraps a decimal amount in major units.
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Builds an amount from minor units (e.g. cents).
    pub fn from_minor_units(units: i64) -> Self {
        Self(Decimal::new(units, MINOR_UNIT_SCALE))
    }

    /// Converts to minor units, rounding half away from zero.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the amount does not fit in an `i64`.
    pub fn to_minor_units(&self) -> Result<i64, ValidationError> {
        (self.0 * Decimal::from(MINOR_UNITS_PER_MAJOR))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or_else(|| ValidationError::invalid_format("amount", "exceeds minor unit range"))
    }

    /// Returns the amount rounded to two decimal places.
    pub fn rounded(&self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Returns the underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true for a zero amount.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true for amounts below zero.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Multiplies by a percentage rate (e.g. `8.25` for 8.25%), rounded to cents.
    pub fn percent(&self, rate: Decimal) -> Self {
        Self(self.0 * rate / Decimal::ONE_HUNDRED).rounded()
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.rounded().0;
        value.rescale(MINOR_UNIT_SCALE);
        write!(f, "{}", value)
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Self)
            .map_err(|e| ValidationError::invalid_format("amount", e.to_string()))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

/// ISO 4217 currency code, stored lowercase as payment providers expect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parses a three-letter currency code.
    pub fn new(code: impl AsRef<str>) -> Result<Self, ValidationError> {
        let code = code.as_ref().trim().to_ascii_lowercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("'{}' is not a three-letter code", code),
            ));
        }
        Ok(Self(code))
    }

    /// US dollars.
    pub fn usd() -> Self {
        Self("usd".to_string())
    }

    /// Returns the lowercase code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}
