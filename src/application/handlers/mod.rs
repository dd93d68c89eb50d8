//! Application handlers.
//!
//! Command handlers that orchestrate domain operations across ports.

pub mod membership;
pub mod notifier;
pub mod order;
pub mod webhook;

pub use membership::{
    CancelMembershipCommand, CancelMembershipHandler, CancelMembershipResult,
    MembershipAccessControl, MembershipSweepHandler, SweepReport, SweepSettings,
};
pub use notifier::MemberNotifier;
pub use order::{
    CheckoutCommand, CheckoutHandler, CheckoutResult, RefundOrderCommand, RefundOrderHandler,
    RefundOrderResult,
};
pub use webhook::{
    ReceiptStatus, StripeEventHandler, WebhookEventHandler, WebhookProcessor, WebhookReceipt,
};
