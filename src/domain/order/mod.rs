//! Order domain module.
//!
//! # Module Structure
//!
//! - `aggregate` - Order aggregate, creation input and updates
//! - `status` - OrderStatus state machine
//! - `checkout` - Transient checkout context
//! - `discount` - Discount and trial details
//! - `code` - Public order code generation
//! - `tax` - Region-based tax

mod aggregate;
mod checkout;
mod code;
mod discount;
mod status;
mod tax;

pub use aggregate::{NewOrder, Order, OrderUpdate, RefundOutcome, DELETED_NOTE};
pub use checkout::{BillingPlan, CheckoutContext, Coupon, CouponDuration, Discount};
pub use code::{
    is_valid_order_code, OrderCodeGenerator, RandomCodeGenerator, SequenceCodeGenerator,
    MAX_CODE_ATTEMPTS, ORDER_CODE_LENGTH,
};
pub use discount::DiscountDetails;
pub use status::OrderStatus;
pub use tax::TaxPolicy;
