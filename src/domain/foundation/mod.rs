//! Foundation module - Shared domain primitives.
//!
//! Identifiers, time, money, errors and the state machine contract used by
//! the membership and order lifecycles.

mod errors;
mod ids;
mod money;
mod state_machine;
mod status_log;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{LevelId, MembershipId, OrderId, UserId};
pub use money::{Currency, Money};
pub use state_machine::StateMachine;
pub use status_log::{StatusChange, StatusLog};
pub use timestamp::Timestamp;
