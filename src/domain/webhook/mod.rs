//! Webhook domain module.
//!
//! Event envelope, signature verification primitives, Stripe payload
//! objects and the webhook error taxonomy.

mod errors;
mod event;
mod signature;
mod stripe_objects;

pub use errors::WebhookError;
#[cfg(test)]
pub use event::WebhookEventBuilder;
pub use event::{StripeEventType, WebhookEvent, WebhookEventData};
pub use signature::{
    compute_signature, sign_payload, validate_timestamp, verify_signature, SignatureHeader,
    DEFAULT_TOLERANCE_SECS, MAX_CLOCK_SKEW_SECS, SIGNATURE_HEADER,
};
pub use stripe_objects::{
    StripeCharge, StripeCoupon, StripeDiscount, StripeDiscountAmount, StripeDiscountRef,
    StripeInvoice, StripeInvoiceLine, StripeList, StripePaymentError, StripePeriod, StripePlan,
    StripePrice, StripePriceRecurring, StripeRefund, StripeSubscription, StripeSubscriptionItem,
};
