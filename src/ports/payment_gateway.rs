//! PaymentGateway port - Provider-agnostic payment operations.
//!
//! Every mutating call returns an [`Outcome`]; adapters translate network
//! and provider errors into stable [`FailureCode`](crate::domain::billing::FailureCode)s
//! so callers never see raw provider errors. Retrying is the caller's job.
//!
//! # Success data keys
//!
//! | Operation | Keys |
//! |---|---|
//! | authorize, charge, void | `transaction_id`, `status` |
//! | refund | `refund_id`, `amount`, `status` |
//! | create_subscription | `subscription_id`, `customer_id`, `status` |
//! | update/cancel_subscription | `subscription_id`, `status` |
//! | create_customer | `customer_id` |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::billing::{BillingUser, GatewayEnvironment, Outcome};
use crate::domain::foundation::Money;
use crate::domain::order::Order;

pub const KEY_TRANSACTION_ID: &str = "transaction_id";
pub const KEY_STATUS: &str = "status";
pub const KEY_REFUND_ID: &str = "refund_id";
pub const KEY_AMOUNT: &str = "amount";
pub const KEY_SUBSCRIPTION_ID: &str = "subscription_id";
pub const KEY_CUSTOMER_ID: &str = "customer_id";

/// A customer as known by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Changes to an existing subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub price_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub cancel_at_period_end: Option<bool>,
    pub metadata: BTreeMap<String, String>,
}

impl SubscriptionUpdate {
    pub fn is_empty(&self) -> bool {
        *self == SubscriptionUpdate::default()
    }
}

/// Port for a payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Name stored on orders (e.g. `stripe`).
    fn gateway_name(&self) -> &str;

    fn environment(&self) -> GatewayEnvironment;

    /// Places a hold for the order total without capturing it.
    async fn authorize(&self, order: &Order) -> Outcome;

    /// Captures the order total immediately.
    async fn charge(&self, order: &Order) -> Outcome;

    /// Cancels an uncaptured payment.
    async fn void(&self, order: &Order) -> Outcome;

    /// Refunds `amount`, or the whole payment when `None`.
    async fn refund(&self, order: &Order, amount: Option<Money>) -> Outcome;

    /// Starts a recurring subscription for the order's plan.
    async fn create_subscription(&self, order: &Order) -> Outcome;

    async fn update_subscription(&self, subscription_id: &str, update: &SubscriptionUpdate)
        -> Outcome;

    async fn cancel_subscription(&self, subscription_id: &str, at_period_end: bool) -> Outcome;

    /// Looks up a customer; lookup errors are logged and reported as `None`.
    async fn get_customer(&self, customer_id: &str) -> Option<Customer>;

    async fn create_customer(&self, user: &BillingUser, payment_method_id: Option<&str>)
        -> Outcome;
}
