//! Billing configuration

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::foundation::Currency;
use crate::domain::order::TaxPolicy;

use super::error::ValidationError;

/// Where processed webhook events are recorded
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdempotencyBackend {
    #[default]
    Postgres,
    Redis,
    Memory,
}

/// Billing behaviour: idempotency, membership sweep and tax
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default)]
    pub idempotency_backend: IdempotencyBackend,

    /// Days a processed webhook event is remembered
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Warn members this many days before their membership ends
    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: i64,

    /// Region that is taxed; no tax when unset
    pub tax_region: Option<String>,

    /// Tax rate in percent
    #[serde(default)]
    pub tax_rate: Decimal,

    /// Seconds between membership sweeps run by the server; 0 disables them
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Default currency for new orders
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl BillingConfig {
    pub fn tax_policy(&self) -> TaxPolicy {
        match self.tax_region.as_deref().map(str::trim) {
            Some(region) if !region.is_empty() => TaxPolicy::new(region, self.tax_rate),
            _ => TaxPolicy::none(),
        }
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn currency(&self) -> Result<Currency, ValidationError> {
        Currency::new(&self.currency)
            .map_err(|_| ValidationError::InvalidCurrency(self.currency.clone()))
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.retention_days == 0 {
            return Err(ValidationError::InvalidRetention);
        }
        if !(1..=90).contains(&self.expiry_warning_days) {
            return Err(ValidationError::InvalidExpiryWarning);
        }
        if self.tax_rate.is_sign_negative() || self.tax_rate > Decimal::ONE_HUNDRED {
            return Err(ValidationError::InvalidTaxRate);
        }
        self.currency()?;
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            idempotency_backend: IdempotencyBackend::default(),
            retention_days: default_retention_days(),
            expiry_warning_days: default_expiry_warning_days(),
            tax_region: None,
            tax_rate: Decimal::ZERO,
            sweep_interval_secs: default_sweep_interval(),
            currency: default_currency(),
        }
    }
}

fn default_retention_days() -> u32 {
    90
}

fn default_expiry_warning_days() -> i64 {
    7
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_currency() -> String {
    "usd".to_string()
}
