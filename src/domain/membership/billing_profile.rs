//! Gateway billing details attached to a membership.

use serde::{Deserialize, Serialize};

use crate::domain::billing::BillingPeriod;
use crate::domain::foundation::Money;

/// Recurring billing details kept on a membership.
///
/// Every field is optional; a profile used as an update is merged
/// field by field so callers only send what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingProfile {
    pub payment_method: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub billing_amount: Option<Money>,
    pub cycle_number: Option<i32>,
    pub cycle_period: Option<BillingPeriod>,
}

impl BillingProfile {
    /// Copies every field present in `update` over this profile.
    pub fn merge(&mut self, update: BillingProfile) {
        if update.payment_method.is_some() {
            self.payment_method = update.payment_method;
        }
        if update.customer_id.is_some() {
            self.customer_id = update.customer_id;
        }
        if update.subscription_id.is_some() {
            self.subscription_id = update.subscription_id;
        }
        if update.billing_amount.is_some() {
            self.billing_amount = update.billing_amount;
        }
        if update.cycle_number.is_some() {
            self.cycle_number = update.cycle_number;
        }
        if update.cycle_period.is_some() {
            self.cycle_period = update.cycle_period;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == BillingProfile::default()
    }
}
