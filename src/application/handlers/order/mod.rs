//! Order handlers.
//!
//! ## Commands
//! - Checkout (one-off charge or subscription)
//! - Refunding a paid order

mod checkout;
mod refund_order;

pub use checkout::{CheckoutCommand, CheckoutHandler, CheckoutResult};
pub use refund_order::{RefundOrderCommand, RefundOrderHandler, RefundOrderResult};
