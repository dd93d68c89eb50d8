//! Payment configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::billing::GatewayEnvironment;

use super::error::ValidationError;

/// Payment configuration (Stripe)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Stripe secret API key
    pub stripe_api_key: SecretString,

    /// Stripe webhook signing secret
    pub stripe_webhook_secret: SecretString,

    /// Override for the Stripe API host
    pub stripe_api_base_url: Option<String>,

    /// Accepted webhook timestamp age in seconds
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,

    /// Bound on every gateway HTTP call
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,

    /// Which side of the provider orders are processed against
    #[serde(default)]
    pub environment: GatewayEnvironment,
}

impl PaymentConfig {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_test_")
    }

    /// Check if using Stripe live mode
    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_live_")
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let api_key = self.stripe_api_key.expose_secret();
        let webhook_secret = self.stripe_webhook_secret.expose_secret();
        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired(
                "KHM_BILLING__PAYMENT__STRIPE_API_KEY",
            ));
        }
        if webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired(
                "KHM_BILLING__PAYMENT__STRIPE_WEBHOOK_SECRET",
            ));
        }

        // Restricted keys (rk_) are accepted alongside secret keys
        if !api_key.starts_with("sk_") && !api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }

        let live_env = self.environment == GatewayEnvironment::Live;
        if (live_env && self.is_test_mode()) || (!live_env && self.is_live_mode()) {
            return Err(ValidationError::StripeEnvironmentMismatch);
        }

        if !(1..=30).contains(&self.gateway_timeout_secs) {
            return Err(ValidationError::InvalidGatewayTimeout);
        }
        if !(1..=3600).contains(&self.webhook_tolerance_secs) {
            return Err(ValidationError::InvalidWebhookTolerance);
        }

        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: SecretString::new(String::new()),
            stripe_webhook_secret: SecretString::new(String::new()),
            stripe_api_base_url: None,
            webhook_tolerance_secs: default_webhook_tolerance(),
            gateway_timeout_secs: default_gateway_timeout(),
            environment: GatewayEnvironment::default(),
        }
    }
}

fn default_webhook_tolerance() -> i64 {
    300
}

fn default_gateway_timeout() -> u64 {
    20
}
