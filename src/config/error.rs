//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Server host and port do not form a socket address")]
    InvalidBindAddress,

    #[error("Request timeout must be between 1 and 60 seconds")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Invalid Stripe API key format")]
    InvalidStripeKey,

    #[error("Invalid Stripe webhook secret format")]
    InvalidStripeWebhookSecret,

    #[error("Live Stripe key used with a sandbox environment, or the reverse")]
    StripeEnvironmentMismatch,

    #[error("Gateway timeout must be between 1 and 30 seconds")]
    InvalidGatewayTimeout,

    #[error("Webhook tolerance must be between 1 and 3600 seconds")]
    InvalidWebhookTolerance,

    #[error("Invalid from email address")]
    InvalidFromEmail,

    #[error("Retention must be at least one day")]
    InvalidRetention,

    #[error("Expiry warning window must be between 1 and 90 days")]
    InvalidExpiryWarning,

    #[error("Tax rate must be between 0 and 100 percent")]
    InvalidTaxRate,

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Redis idempotency backend requires redis.url")]
    RedisBackendWithoutUrl,
}
