//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `stripe` - Stripe REST gateway and webhook verification
//! - `postgres` - Repositories and the idempotency store over sqlx
//! - `redis` - Idempotency store for multi-server deployments
//! - `email` - Tracing-backed email delivery
//! - `http` - Axum webhook endpoint
//! - `memory` - In-memory implementations for tests and local runs

pub mod email;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod stripe;
