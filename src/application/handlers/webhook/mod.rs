//! Webhook handling.
//!
//! - `processor` - Verification, idempotent claiming and dispatch
//! - `stripe_events` - Stripe event types mapped onto orders and memberships
//! - `resolve` - Metadata lookups tying provider objects to users and levels

mod processor;
mod resolve;
mod stripe_events;

pub use processor::{ReceiptStatus, WebhookEventHandler, WebhookProcessor, WebhookReceipt};
pub use resolve::{Resolved, META_LEVEL_ID, META_ORDER_CODE, META_ORDER_ID, META_USER_ID};
pub use stripe_events::StripeEventHandler;
