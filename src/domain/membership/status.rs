//! Membership status state machine.
//!
//! Defines all membership states and the valid transitions of the
//! subscription lifecycle.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Membership lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// Paid up with full access.
    Active,

    /// A payment failed; the provider is still retrying. No access.
    PastDue,

    /// Suspended by the member or an admin. Level assignment is kept.
    Paused,

    /// Ended by a cancellation or exhausted payment retries.
    Cancelled,

    /// Reached its end date.
    Expired,
}

impl MembershipStatus {
    /// All statuses, in declaration order.
    pub const ALL: [MembershipStatus; 5] = [
        MembershipStatus::Active,
        MembershipStatus::PastDue,
        MembershipStatus::Paused,
        MembershipStatus::Cancelled,
        MembershipStatus::Expired,
    ];

    /// Returns true if this status grants access to the level's content.
    ///
    /// Only `Active` does; a past-due member loses access until the
    /// payment recovers.
    pub fn has_access(&self) -> bool {
        matches!(self, MembershipStatus::Active)
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::PastDue => "past_due",
            MembershipStatus::Paused => "paused",
            MembershipStatus::Cancelled => "cancelled",
            MembershipStatus::Expired => "expired",
        }
    }
}

impl StateMachine for MembershipStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use MembershipStatus::*;
        matches!(
            (self, target),
            // From ACTIVE
            (Active, PastDue)
                | (Active, Paused)
                | (Active, Cancelled)
                | (Active, Expired)
            // From PAST_DUE
                | (PastDue, Active)
                | (PastDue, Cancelled)
            // From PAUSED
                | (Paused, Active)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use MembershipStatus::*;
        match self {
            Active => vec![PastDue, Paused, Cancelled, Expired],
            PastDue => vec![Active, Cancelled],
            Paused => vec![Active],
            Cancelled | Expired => vec![],
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MembershipStatus::Active),
            "past_due" => Ok(MembershipStatus::PastDue),
            "paused" => Ok(MembershipStatus::Paused),
            "cancelled" => Ok(MembershipStatus::Cancelled),
            "expired" => Ok(MembershipStatus::Expired),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown membership status '{}'", other),
            )),
        }
    }
}
