//! Membership domain module.
//!
//! Handles the per-level membership lifecycle and access.
//!
//! # Module Structure
//!
//! - `aggregate` - Membership aggregate entity
//! - `status` - MembershipStatus state machine
//! - `billing_profile` - Gateway billing details

mod aggregate;
mod billing_profile;
mod status;

pub use aggregate::{AssignOptions, Membership, TransitionOutcome, ASSIGNED_REASON};
pub use billing_profile::BillingProfile;
pub use status::MembershipStatus;
