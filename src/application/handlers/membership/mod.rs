//! Membership handlers.
//!
//! ## Commands
//! - Cancelling memberships (and their gateway subscriptions)
//! - Sweeping lapsed and expiring memberships
//!
//! ## Queries
//! - Content access checks

mod access_control;
mod cancel_membership;
mod membership_sweep;

// Commands
pub use cancel_membership::{CancelMembershipCommand, CancelMembershipHandler, CancelMembershipResult};
pub use membership_sweep::{MembershipSweepHandler, SweepReport, SweepSettings, INTERNAL_GATEWAY};

// Queries
pub use access_control::MembershipAccessControl;
