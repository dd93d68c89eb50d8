//! Redis adapters.

mod idempotency_store;

pub use idempotency_store::RedisIdempotencyStore;
