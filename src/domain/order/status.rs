//! Order status state machine.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created at checkout, not yet paid.
    Pending,
    /// Paid.
    Success,
    /// A renewal payment failed.
    PastDue,
    /// The subscription behind the order ended.
    Cancelled,
    /// Fully refunded.
    Refunded,
    /// Soft-deleted. Rows are never physically removed.
    Deleted,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Success,
        OrderStatus::PastDue,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
        OrderStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Success => "success",
            OrderStatus::PastDue => "past_due",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Deleted => "deleted",
        }
    }
}

impl StateMachine for OrderStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use OrderStatus::*;
        if *target == Deleted {
            return *self != Deleted;
        }
        matches!(
            (self, target),
            (Pending, Success)
                | (Success, Refunded)
                | (Success, PastDue)
                | (Success, Cancelled)
                | (PastDue, Success)
                | (PastDue, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use OrderStatus::*;
        match self {
            Pending => vec![Success, Deleted],
            Success => vec![Refunded, PastDue, Cancelled, Deleted],
            PastDue => vec![Success, Cancelled, Deleted],
            Cancelled | Refunded => vec![Deleted],
            Deleted => vec![],
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("status", format!("unknown order status '{}'", s))
            })
    }
}
