//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Payment Ports
//!
//! - `PaymentGateway` - Provider-agnostic payment and subscription calls
//! - `WebhookVerifier` - Signature verification and event parsing
//!
//! ## Persistence Ports
//!
//! - `IdempotencyStore` - Processed webhook tracking
//! - `MembershipRepository` - Membership lifecycle per (user, level)
//! - `OrderRepository` - Orders, refunds and codes
//! - `UserDirectory` - Site users
//!
//! ## Collaborator Ports
//!
//! - `EmailService` - Templated notifications
//! - `AccessControl` - Content access checks

mod access_control;
mod email_service;
mod idempotency_store;
mod membership_repository;
mod order_repository;
mod payment_gateway;
mod user_directory;
mod webhook_verifier;

pub use access_control::AccessControl;
pub use email_service::{
    EmailMessage, EmailService, TEMPLATE_MEMBERSHIP_CANCELLED, TEMPLATE_MEMBERSHIP_EXPIRED,
    TEMPLATE_MEMBERSHIP_EXPIRING, TEMPLATE_PAYMENT_FAILED,
};
pub use idempotency_store::{IdempotencyStore, ProcessedEvent, SaveResult};
pub use membership_repository::{
    MembershipChange, MembershipPage, MembershipQuery, MembershipRepository, MembershipSort,
    MAX_CAS_RETRIES, REACTIVATED_REASON,
};
pub use order_repository::{
    OrderChange, OrderFilter, OrderPage, OrderQuery, OrderRepository, DEFAULT_PER_PAGE,
    MAX_PER_PAGE,
};
pub use payment_gateway::{
    Customer, PaymentGateway, SubscriptionUpdate, KEY_AMOUNT, KEY_CUSTOMER_ID, KEY_REFUND_ID,
    KEY_STATUS, KEY_SUBSCRIPTION_ID, KEY_TRANSACTION_ID,
};
pub use user_directory::UserDirectory;
pub use webhook_verifier::WebhookVerifier;
