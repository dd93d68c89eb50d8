//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresMembershipRepository` - Memberships with version-checked writes
//! - `PostgresOrderRepository` - Orders, codes and refunds
//! - `PostgresIdempotencyStore` - Processed webhook events
//! - `PostgresUserDirectory` - Site users

mod idempotency_store;
mod membership_repository;
mod order_repository;
mod user_directory;

pub use idempotency_store::PostgresIdempotencyStore;
pub use membership_repository::PostgresMembershipRepository;
pub use order_repository::PostgresOrderRepository;
pub use user_directory::PostgresUserDirectory;

/// Migrations for the billing schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
