//! Transient checkout context carried on an order.
//!
//! None of this is persisted; it travels with the order from checkout to
//! the gateway call.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::billing::BillingPeriod;
use crate::domain::foundation::Money;

/// Data the gateway needs to charge or subscribe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutContext {
    /// Provider payment method reference (e.g. `pm_...`).
    pub payment_method_id: Option<String>,
    /// Provider customer id, when the user already has one.
    pub customer_id: Option<String>,
    /// Display name of the level, used in descriptions and product names.
    pub level_name: Option<String>,
    pub plan: Option<BillingPlan>,
    pub coupon: Option<Coupon>,
}

/// Recurring billing plan for a subscription checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPlan {
    pub amount: Money,
    pub period: BillingPeriod,
    /// Number of periods between charges.
    pub frequency: u32,
    pub trial_days: u32,
    /// Pre-existing provider price id; a price is created when absent.
    pub price_id: Option<String>,
}

impl BillingPlan {
    pub fn new(amount: Money, period: BillingPeriod) -> Self {
        Self {
            amount,
            period,
            frequency: 1,
            trial_days: 0,
            price_id: None,
        }
    }
}

/// Discount applied to a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount: Discount,
    pub duration: CouponDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Percentage off, e.g. `25` for 25%.
    Percent(Decimal),
    Amount(Money),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponDuration {
    Once,
    Forever,
}

impl CouponDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponDuration::Once => "once",
            CouponDuration::Forever => "forever",
        }
    }
}
