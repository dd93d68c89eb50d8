//! KHM Billing - Membership and payment core
//!
//! Charges, subscriptions and refunds through a payment gateway, verified
//! and idempotent webhook intake, and the membership and order lifecycles
//! those events drive.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
