//! Stripe API objects as they arrive in webhook payloads.
//!
//! Fields are optional wherever Stripe omits them on some event types, so
//! a sparse test payload still deserializes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::foundation::Money;
use crate::domain::order::{Discount, DiscountDetails};

const SECONDS_PER_DAY: i64 = 86_400;

/// Stripe Charge object.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeCharge {
    /// Charge id (`ch_...`).
    pub id: String,

    /// Amount in minor units.
    #[serde(default)]
    pub amount: i64,

    /// Cumulative refunded amount in minor units.
    #[serde(default)]
    pub amount_refunded: i64,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub customer: Option<String>,

    #[serde(default)]
    pub payment_intent: Option<String>,

    #[serde(default)]
    pub invoice: Option<String>,

    #[serde(default)]
    pub refunded: bool,

    #[serde(default)]
    pub failure_code: Option<String>,

    #[serde(default)]
    pub failure_message: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub refunds: StripeList<StripeRefund>,
}

impl StripeCharge {
    /// Reason of the most recent refund, if Stripe included the list.
    pub fn latest_refund_reason(&self) -> Option<&str> {
        self.refunds
            .data
            .iter()
            .max_by_key(|r| r.created)
            .and_then(|r| r.reason.as_deref())
    }
}

/// Stripe Refund object (embedded in charges).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeRefund {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub created: i64,
}

/// Generic Stripe list wrapper.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

/// Stripe Invoice object.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeInvoice {
    /// Invoice id (`in_...`).
    pub id: String,

    #[serde(default)]
    pub customer: Option<String>,

    #[serde(default)]
    pub subscription: Option<String>,

    #[serde(default)]
    pub charge: Option<String>,

    #[serde(default)]
    pub payment_intent: Option<String>,

    /// Amount paid in minor units.
    #[serde(default)]
    pub amount_paid: i64,

    /// Amount due in minor units.
    #[serde(default)]
    pub amount_due: i64,

    #[serde(default)]
    pub subtotal: Option<i64>,

    #[serde(default)]
    pub tax: Option<i64>,

    #[serde(default)]
    pub total: Option<i64>,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub attempt_count: i32,

    #[serde(default)]
    pub customer_email: Option<String>,

    #[serde(default)]
    pub last_payment_error: Option<StripePaymentError>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub lines: StripeList<StripeInvoiceLine>,

    #[serde(default)]
    pub discount: Option<StripeDiscount>,

    /// Newer API versions list discounts, as ids unless expanded.
    #[serde(default)]
    pub discounts: Vec<StripeDiscountRef>,

    #[serde(default)]
    pub total_discount_amounts: Vec<StripeDiscountAmount>,
}

impl StripeInvoice {
    /// Plan id of the first line item, if any.
    pub fn first_plan_id(&self) -> Option<&str> {
        self.lines.data.first().and_then(StripeInvoiceLine::plan_id)
    }

    /// Discount applied to this invoice: the summed discount amount plus
    /// the coupon code and duration.
    pub fn discount_details(&self) -> DiscountDetails {
        let mut details = DiscountDetails::default();
        let total: i64 = self.total_discount_amounts.iter().map(|d| d.amount).sum();
        if total > 0 {
            details.discount_amount = Some(Money::from_minor_units(total));
        }

        let coupon = self
            .discount
            .as_ref()
            .and_then(|d| d.coupon.as_ref())
            .or_else(|| {
                self.discounts.first().and_then(|d| match d {
                    StripeDiscountRef::Expanded(discount) => discount.coupon.as_ref(),
                    StripeDiscountRef::Id(_) => None,
                })
            });
        if let Some(coupon) = coupon {
            details.merge(&coupon.discount_details(false));
        }
        details
    }

    /// Period end of the first line item.
    pub fn first_period_end(&self) -> Option<i64> {
        self.lines
            .data
            .first()
            .and_then(|line| line.period.as_ref())
            .map(|p| p.end)
    }
}

/// Error attached to a failed invoice payment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripePaymentError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub decline_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StripePaymentError {
    /// Message, falling back to the decline code.
    pub fn describe(&self) -> Option<&str> {
        self.message.as_deref().or(self.decline_code.as_deref())
    }
}

/// Single invoice line item.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeInvoiceLine {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub plan: Option<StripePlan>,

    #[serde(default)]
    pub price: Option<StripePrice>,

    #[serde(default)]
    pub period: Option<StripePeriod>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeInvoiceLine {
    pub fn plan_id(&self) -> Option<&str> {
        self.plan
            .as_ref()
            .map(|p| p.id.as_str())
            .or_else(|| self.price.as_ref().map(|p| p.id.as_str()))
    }
}

/// Billing period of an invoice line.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct StripePeriod {
    pub start: i64,
    pub end: i64,
}

/// Stripe Plan object (legacy, still embedded in lines and items).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripePlan {
    pub id: String,

    /// Amount in minor units.
    #[serde(default)]
    pub amount: Option<i64>,

    #[serde(default)]
    pub interval: Option<String>,

    #[serde(default)]
    pub interval_count: Option<i32>,
}

/// Stripe Price object.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripePrice {
    pub id: String,

    /// Unit amount in minor units.
    #[serde(default)]
    pub unit_amount: Option<i64>,

    #[serde(default)]
    pub recurring: Option<StripePriceRecurring>,
}

/// Price recurring configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripePriceRecurring {
    /// Billing interval (day, week, month, year).
    pub interval: String,

    #[serde(default)]
    pub interval_count: Option<i32>,
}

/// Stripe Subscription object.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeSubscription {
    /// Subscription id (`sub_...`).
    pub id: String,

    #[serde(default)]
    pub customer: Option<String>,

    /// Subscription status (active, trialing, past_due, unpaid, canceled, ...).
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub current_period_end: Option<i64>,

    #[serde(default)]
    pub cancel_at_period_end: bool,

    #[serde(default)]
    pub default_payment_method: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub items: StripeList<StripeSubscriptionItem>,

    #[serde(default)]
    pub discount: Option<StripeDiscount>,

    #[serde(default)]
    pub trial_start: Option<i64>,

    #[serde(default)]
    pub trial_end: Option<i64>,
}

impl StripeSubscription {
    /// Plan or price of the first item, as `(amount, interval, interval_count)`.
    pub fn billing_terms(&self) -> Option<(Option<i64>, Option<String>, Option<i32>)> {
        let item = self.items.data.first()?;
        if let Some(price) = &item.price {
            let recurring = price.recurring.as_ref();
            return Some((
                price.unit_amount,
                recurring.map(|r| r.interval.clone()),
                recurring.and_then(|r| r.interval_count),
            ));
        }
        item.plan
            .as_ref()
            .map(|plan| (plan.amount, plan.interval.clone(), plan.interval_count))
    }

    /// Recurring coupon terms and trial length, in whole days.
    pub fn discount_details(&self) -> DiscountDetails {
        let mut details = self
            .discount
            .as_ref()
            .and_then(|d| d.coupon.as_ref())
            .map(|c| c.discount_details(true))
            .unwrap_or_default();
        if let (Some(start), Some(end)) = (self.trial_start, self.trial_end) {
            let days = (end - start).max(0) / SECONDS_PER_DAY;
            details.trial_days = Some(u32::try_from(days).unwrap_or(u32::MAX));
        }
        details
    }
}

/// Single subscription item.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeSubscriptionItem {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub price: Option<StripePrice>,

    #[serde(default)]
    pub plan: Option<StripePlan>,
}

/// Discount attached to an invoice or subscription.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeDiscount {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub coupon: Option<StripeCoupon>,
}

/// Entry of an invoice's `discounts` list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StripeDiscountRef {
    Id(String),
    Expanded(StripeDiscount),
}

/// Amount one discount took off an invoice.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeDiscountAmount {
    /// Minor units.
    #[serde(default)]
    pub amount: i64,
}

/// Stripe Coupon object.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeCoupon {
    pub id: String,

    #[serde(default)]
    pub percent_off: Option<f64>,

    /// Minor units.
    #[serde(default)]
    pub amount_off: Option<i64>,

    /// once, repeating or forever.
    #[serde(default)]
    pub duration: Option<String>,
}

impl StripeCoupon {
    /// The coupon's discount; zero amounts count as absent.
    pub fn discount(&self) -> Option<Discount> {
        if let Some(percent) = self
            .percent_off
            .filter(|p| *p > 0.0)
            .and_then(|p| Decimal::try_from(p).ok())
        {
            return Some(Discount::Percent(percent.normalize()));
        }
        self.amount_off
            .filter(|a| *a > 0)
            .map(|a| Discount::Amount(Money::from_minor_units(a)))
    }

    /// Recurring terms are only kept in a subscription context.
    pub fn discount_details(&self, recurring: bool) -> DiscountDetails {
        DiscountDetails {
            discount_code: Some(self.id.clone()),
            discount_amount: None,
            recurring_discount: if recurring { self.discount() } else { None },
            first_payment_only: (self.duration.as_deref() == Some("once")).then_some(true),
            trial_days: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn charge_deserializes_with_metadata() {
        let charge: StripeCharge = serde_json::from_value(json!({
            "id": "ch_1",
            "amount": 1999,
            "payment_intent": "pi_1",
            "metadata": {"order_code": "ORD-1", "user_id": "42"}
        }))
        .unwrap();

        assert_eq!(charge.amount, 1999);
        assert_eq!(charge.metadata.get("order_code").map(String::as_str), Some("ORD-1"));
        assert!(charge.refunds.data.is_empty());
    }

    #[test]
    fn latest_refund_reason_picks_newest() {
        let charge: StripeCharge = serde_json::from_value(json!({
            "id": "ch_1",
            "refunds": {"data": [
                {"id": "re_1", "reason": "duplicate", "created": 10},
                {"id": "re_2", "reason": "requested_by_customer", "created": 20}
            ]}
        }))
        .unwrap();

        assert_eq!(charge.latest_refund_reason(), Some("requested_by_customer"));
    }

    #[test]
    fn invoice_first_plan_id_falls_back_to_price() {
        let invoice: StripeInvoice = serde_json::from_value(json!({
            "id": "in_1",
            "lines": {"data": [{"price": {"id": "khm_level_7"}, "period": {"start": 1, "end": 2}}]}
        }))
        .unwrap();

        assert_eq!(invoice.first_plan_id(), Some("khm_level_7"));
        assert_eq!(invoice.first_period_end(), Some(2));
    }

    #[test]
    fn invoice_payment_error_falls_back_to_decline_code() {
        let invoice: StripeInvoice = serde_json::from_value(json!({
            "id": "in_1",
            "last_payment_error": {"code": "card_declined", "decline_code": "insufficient_funds"}
        }))
        .unwrap();

        let error = invoice.last_payment_error.unwrap();
        assert_eq!(error.code.as_deref(), Some("card_declined"));
        assert_eq!(error.describe(), Some("insufficient_funds"));
    }

    #[test]
    fn invoice_discount_sums_amounts_and_drops_recurring_terms() {
        let invoice: StripeInvoice = serde_json::from_value(json!({
            "id": "in_1",
            "total_discount_amounts": [{"amount": 300}, {"amount": 200}],
            "discount": {"coupon": {"id": "SPRING", "percent_off": 25.0, "duration": "once"}}
        }))
        .unwrap();

        let details = invoice.discount_details();

        assert_eq!(details.discount_amount, Some(Money::from_minor_units(500)));
        assert_eq!(details.discount_code.as_deref(), Some("SPRING"));
        assert_eq!(details.first_payment_only, Some(true));
        assert!(details.recurring_discount.is_none());
    }

    #[test]
    fn invoice_discount_falls_back_to_expanded_discounts_list() {
        let invoice: StripeInvoice = serde_json::from_value(json!({
            "id": "in_1",
            "discounts": [{"id": "di_1", "coupon": {"id": "LIST", "amount_off": 500}}]
        }))
        .unwrap();
        assert_eq!(invoice.discount_details().discount_code.as_deref(), Some("LIST"));

        let ids_only: StripeInvoice = serde_json::from_value(json!({
            "id": "in_2",
            "discounts": ["di_1"]
        }))
        .unwrap();
        assert!(ids_only.discount_details().is_empty());
    }

    #[test]
    fn subscription_discount_keeps_recurring_terms_and_trial() {
        let sub: StripeSubscription = serde_json::from_value(json!({
            "id": "sub_1",
            "status": "trialing",
            "discount": {"coupon": {"id": "LOYAL", "amount_off": 250, "duration": "forever"}},
            "trial_start": 1_700_000_000,
            "trial_end": 1_700_000_000 + 14 * 86_400 + 3_600
        }))
        .unwrap();

        let details = sub.discount_details();

        assert_eq!(
            details.recurring_discount,
            Some(Discount::Amount(Money::from_minor_units(250)))
        );
        assert_eq!(details.trial_days, Some(14));
        assert!(details.first_payment_only.is_none());
    }

    #[test]
    fn subscription_billing_terms_prefer_price() {
        let sub: StripeSubscription = serde_json::from_value(json!({
            "id": "sub_1",
            "status": "active",
            "items": {"data": [{
                "price": {"id": "price_1", "unit_amount": 1500, "recurring": {"interval": "month", "interval_count": 1}},
                "plan": {"id": "plan_1", "amount": 999, "interval": "year"}
            }]}
        }))
        .unwrap();

        let (amount, interval, count) = sub.billing_terms().unwrap();
        assert_eq!(amount, Some(1500));
        assert_eq!(interval.as_deref(), Some("month"));
        assert_eq!(count, Some(1));
    }
}