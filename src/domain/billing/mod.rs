//! Billing primitives shared by gateways, orders and memberships.

mod environment;
mod outcome;
mod period;
mod user;

pub use environment::GatewayEnvironment;
pub use outcome::{FailureCode, Outcome};
pub use period::BillingPeriod;
pub use user::BillingUser;
