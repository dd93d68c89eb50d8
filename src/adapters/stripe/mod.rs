//! Stripe adapters.
//!
//! - `StripeGateway` implements `PaymentGateway` over the REST API
//! - `StripeWebhookVerifier` implements `WebhookVerifier`
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated to prevent replay attacks (5-minute window)
//! - API keys are held as `secrecy::SecretString`

mod api_types;
mod stripe_gateway;
mod webhook_verifier;

pub use stripe_gateway::{
    StripeConfig, StripeGateway, DEFAULT_API_BASE_URL, DEFAULT_TIMEOUT, GATEWAY_NAME,
};
pub use webhook_verifier::StripeWebhookVerifier;
