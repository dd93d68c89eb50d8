//! HTTP adapters - Webhook intake over axum.

pub mod webhook;

pub use webhook::{webhook_router, webhook_routes, WebhookAppState};
