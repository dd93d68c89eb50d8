//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables carry the `KHM_BILLING` prefix
//! and nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use khm_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Listening on port {}", config.server.port);
//! ```

mod billing;
mod database;
mod email;
mod error;
mod payment;
mod redis;
mod server;

pub use billing::{BillingConfig, IdempotencyBackend};
pub use database::DatabaseConfig;
pub use email::EmailConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Redis configuration (idempotency backend)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Payment configuration (Stripe)
    pub payment: PaymentConfig,

    /// Sender identity for member emails
    #[serde(default)]
    pub email: EmailConfig,

    /// Idempotency, sweep and tax settings
    #[serde(default)]
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `KHM_BILLING` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `KHM_BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `KHM_BILLING__BILLING__IDEMPOTENCY_BACKEND=redis` -> `billing.idempotency_backend`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("KHM_BILLING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.redis.validate()?;
        self.payment.validate()?;
        self.email.validate()?;
        self.billing.validate()?;
        if self.billing.idempotency_backend == IdempotencyBackend::Redis
            && !self.redis.is_configured()
        {
            return Err(ValidationError::RedisBackendWithoutUrl);
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
