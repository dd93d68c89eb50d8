//! Application layer - Command handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod handlers;

pub use handlers::{
    // Webhooks
    ReceiptStatus, StripeEventHandler, WebhookEventHandler, WebhookProcessor, WebhookReceipt,
    // Orders
    CheckoutCommand, CheckoutHandler, CheckoutResult, RefundOrderCommand, RefundOrderHandler,
    RefundOrderResult,
    // Memberships
    CancelMembershipCommand, CancelMembershipHandler, CancelMembershipResult,
    MembershipAccessControl, MembershipSweepHandler, SweepReport, SweepSettings,
    // Notifications
    MemberNotifier,
};
