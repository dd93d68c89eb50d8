//! Discount and trial details recorded on an order.
//!
//! Filled from checkout coupons and reconciled from provider invoices and
//! subscriptions. Every field is optional; merging only overwrites the
//! fields the newer source knows about.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Money;

use super::{Coupon, CouponDuration, Discount};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountDetails {
    /// Coupon or promotion code.
    pub discount_code: Option<String>,
    /// Amount taken off this order.
    pub discount_amount: Option<Money>,
    /// Discount applied to later renewals.
    pub recurring_discount: Option<Discount>,
    /// The coupon applies to the first payment only.
    pub first_payment_only: Option<bool>,
    pub trial_days: Option<u32>,
}

impl DiscountDetails {
    /// Details of a coupon used at checkout.
    pub fn from_coupon(coupon: &Coupon) -> Self {
        let once = coupon.duration == CouponDuration::Once;
        Self {
            discount_code: Some(coupon.code.clone()),
            discount_amount: None,
            recurring_discount: (!once).then_some(coupon.discount),
            first_payment_only: once.then_some(true),
            trial_days: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Overwrites the fields present in `other`. Returns true if anything
    /// changed.
    pub fn merge(&mut self, other: &DiscountDetails) -> bool {
        let before = self.clone();
        if let Some(code) = &other.discount_code {
            self.discount_code = Some(code.clone());
        }
        if other.discount_amount.is_some() {
            self.discount_amount = other.discount_amount;
        }
        if other.recurring_discount.is_some() {
            self.recurring_discount = other.recurring_discount;
        }
        if other.first_payment_only.is_some() {
            self.first_payment_only = other.first_payment_only;
        }
        if other.trial_days.is_some() {
            self.trial_days = other.trial_days;
        }
        *self != before
    }

    /// Storage name of the recurring discount kind.
    pub fn recurring_discount_type(&self) -> Option<&'static str> {
        self.recurring_discount.map(|d| match d {
            Discount::Percent(_) => "percent",
            Discount::Amount(_) => "amount",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn once_coupon_marks_first_payment_only() {
        let details = DiscountDetails::from_coupon(&Coupon {
            code: "WELCOME".to_string(),
            discount: Discount::Percent(Decimal::new(25, 0)),
            duration: CouponDuration::Once,
        });

        assert_eq!(details.discount_code.as_deref(), Some("WELCOME"));
        assert_eq!(details.first_payment_only, Some(true));
        assert!(details.recurring_discount.is_none());
    }

    #[test]
    fn forever_coupon_keeps_recurring_discount() {
        let details = DiscountDetails::from_coupon(&Coupon {
            code: "LOYAL".to_string(),
            discount: Discount::Amount(Money::from_minor_units(500)),
            duration: CouponDuration::Forever,
        });

        assert_eq!(
            details.recurring_discount,
            Some(Discount::Amount(Money::from_minor_units(500)))
        );
        assert_eq!(details.recurring_discount_type(), Some("amount"));
        assert!(details.first_payment_only.is_none());
    }

    #[test]
    fn merge_only_overwrites_present_fields() {
        let mut details = DiscountDetails {
            discount_code: Some("OLD".to_string()),
            trial_days: Some(14),
            ..Default::default()
        };

        let changed = details.merge(&DiscountDetails {
            discount_code: Some("NEW".to_string()),
            discount_amount: Some(Money::from_minor_units(250)),
            ..Default::default()
        });

        assert!(changed);
        assert_eq!(details.discount_code.as_deref(), Some("NEW"));
        assert_eq!(details.trial_days, Some(14));
        assert!(!details.clone().merge(&details));
    }
}
