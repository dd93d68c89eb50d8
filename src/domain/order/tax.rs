//! Region-based sales tax.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::Money;

/// A single taxed region and its rate in percent.
///
/// Orders billed to any other region are not taxed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxPolicy {
    pub region: Option<String>,
    pub rate: Decimal,
}

impl TaxPolicy {
    pub fn new(region: impl Into<String>, rate: Decimal) -> Self {
        Self {
            region: Some(region.into()),
            rate,
        }
    }

    /// No tax anywhere.
    pub fn none() -> Self {
        Self::default()
    }

    /// Tax due on `subtotal` for an order billed to `billing_region`.
    ///
    /// Regions compare case-insensitively; the result is rounded to cents.
    pub fn calculate_tax(&self, subtotal: Money, billing_region: Option<&str>) -> Money {
        match (&self.region, billing_region) {
            (Some(taxed), Some(billed))
                if taxed.trim().eq_ignore_ascii_case(billed.trim()) && !self.rate.is_zero() =>
            {
                subtotal.percent(self.rate)
            }
            _ => Money::ZERO,
        }
    }
}
