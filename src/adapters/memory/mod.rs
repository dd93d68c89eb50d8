//! In-memory adapters.
//!
//! Used by tests and by local runs without Postgres or Redis.

mod email;
mod gateway;
mod idempotency_store;
mod membership_repository;
mod order_repository;
mod user_directory;

pub use email::{RecordingEmailService, SentEmail};
pub use gateway::{GatewayCall, MockPaymentGateway};
pub use idempotency_store::InMemoryIdempotencyStore;
pub use membership_repository::InMemoryMembershipRepository;
pub use order_repository::InMemoryOrderRepository;
pub use user_directory::InMemoryUserDirectory;
