//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, money, errors)
//! - `billing` - Gateway outcomes, environments, periods and billing users
//! - `membership` - Membership lifecycle and access
//! - `order` - Order lifecycle, refunds, codes and tax
//! - `webhook` - Webhook events, signatures and errors

pub mod billing;
pub mod foundation;
pub mod membership;
pub mod order;
pub mod webhook;
