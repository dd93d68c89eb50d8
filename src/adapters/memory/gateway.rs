//! Scriptable payment gateway for tests.
//!
//! Every call is logged. Each method answers with the next scripted
//! [`Outcome`] queued for it, or a plausible success carrying the same
//! data keys the real adapter returns.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::billing::{BillingUser, GatewayEnvironment, Outcome};
use crate::domain::foundation::Money;
use crate::domain::order::Order;
use crate::ports::{
    Customer, PaymentGateway, SubscriptionUpdate, KEY_AMOUNT, KEY_CUSTOMER_ID, KEY_REFUND_ID,
    KEY_STATUS, KEY_SUBSCRIPTION_ID, KEY_TRANSACTION_ID,
};

/// Recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub method: &'static str,
    pub args: Vec<String>,
}

#[derive(Default)]
struct MockState {
    scripted: HashMap<&'static str, VecDeque<Outcome>>,
    customers: HashMap<String, Customer>,
    call_log: Vec<GatewayCall>,
}

#[derive(Clone, Default)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
    sequence: Arc<AtomicU64>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `outcome` as the next answer of `method`.
    pub fn script(&self, method: &'static str, outcome: Outcome) {
        self.state()
            .scripted
            .entry(method)
            .or_default()
            .push_back(outcome);
    }

    pub fn add_customer(&self, customer: Customer) {
        self.state().customers.insert(customer.id.clone(), customer);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().call_log.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        match self.inner.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_mock_{}", prefix, self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Logs the call and pops a scripted answer, if any.
    fn answer(&self, method: &'static str, args: Vec<String>) -> Option<Outcome> {
        let mut state = self.state();
        state.call_log.push(GatewayCall { method, args });
        state.scripted.get_mut(method).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn gateway_name(&self) -> &str {
        "mock"
    }

    fn environment(&self) -> GatewayEnvironment {
        GatewayEnvironment::Sandbox
    }

    async fn authorize(&self, order: &Order) -> Outcome {
        self.answer("authorize", vec![order.code.clone()])
            .unwrap_or_else(|| {
                Outcome::success()
                    .with(KEY_TRANSACTION_ID, self.next_id("pi"))
                    .with(KEY_STATUS, "requires_capture")
            })
    }

    async fn charge(&self, order: &Order) -> Outcome {
        self.answer("charge", vec![order.code.clone(), order.total.to_string()])
            .unwrap_or_else(|| {
                Outcome::success()
                    .with(KEY_TRANSACTION_ID, self.next_id("pi"))
                    .with(KEY_STATUS, "succeeded")
            })
    }

    async fn void(&self, order: &Order) -> Outcome {
        self.answer(
            "void",
            vec![order.payment_transaction_id.clone().unwrap_or_default()],
        )
        .unwrap_or_else(|| Outcome::success().with(KEY_STATUS, "canceled"))
    }

    async fn refund(&self, order: &Order, amount: Option<Money>) -> Outcome {
        let refunded = amount.unwrap_or(order.total);
        self.answer(
            "refund",
            vec![
                order.payment_transaction_id.clone().unwrap_or_default(),
                refunded.to_string(),
            ],
        )
        .unwrap_or_else(|| {
            Outcome::success()
                .with(KEY_REFUND_ID, self.next_id("re"))
                .with(KEY_AMOUNT, refunded.to_string())
                .with(KEY_STATUS, "succeeded")
        })
    }

    async fn create_subscription(&self, order: &Order) -> Outcome {
        self.answer("create_subscription", vec![order.code.clone()])
            .unwrap_or_else(|| {
                Outcome::success()
                    .with(KEY_SUBSCRIPTION_ID, self.next_id("sub"))
                    .with(KEY_CUSTOMER_ID, self.next_id("cus"))
                    .with(KEY_STATUS, "active")
            })
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: &SubscriptionUpdate,
    ) -> Outcome {
        let mut args = vec![subscription_id.to_string()];
        args.extend(update.price_id.clone());
        self.answer("update_subscription", args).unwrap_or_else(|| {
            Outcome::success()
                .with(KEY_SUBSCRIPTION_ID, subscription_id)
                .with(KEY_STATUS, "active")
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str, at_period_end: bool) -> Outcome {
        self.answer(
            "cancel_subscription",
            vec![subscription_id.to_string(), at_period_end.to_string()],
        )
        .unwrap_or_else(|| {
            let status = if at_period_end { "active" } else { "canceled" };
            Outcome::success()
                .with(KEY_SUBSCRIPTION_ID, subscription_id)
                .with(KEY_STATUS, status)
        })
    }

    async fn get_customer(&self, customer_id: &str) -> Option<Customer> {
        self.state().call_log.push(GatewayCall {
            method: "get_customer",
            args: vec![customer_id.to_string()],
        });
        self.state().customers.get(customer_id).cloned()
    }

    async fn create_customer(
        &self,
        user: &BillingUser,
        payment_method_id: Option<&str>,
    ) -> Outcome {
        let mut args = vec![user.id.to_string()];
        args.extend(payment_method_id.map(str::to_string));
        if let Some(scripted) = self.answer("create_customer", args) {
            return scripted;
        }

        let customer = Customer {
            id: self.next_id("cus"),
            email: Some(user.email.clone()),
            name: Some(user.name().to_string()),
        };
        let id = customer.id.clone();
        self.add_customer(customer);
        Outcome::success().with(KEY_CUSTOMER_ID, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::FailureCode;
    use crate::domain::foundation::{LevelId, OrderId, UserId};
    use crate::domain::order::NewOrder;

    fn order() -> Order {
        let new = NewOrder::new(UserId::new(1), LevelId::new(2), "mock")
            .with_amounts(Money::from_minor_units(1000), Money::ZERO);
        Order::from_new(OrderId::new(1), "ABCDEFGHIJ".to_string(), new)
    }

    #[tokio::test]
    async fn default_answers_succeed_with_transaction_ids() {
        let gateway = MockPaymentGateway::new();
        let outcome = gateway.charge(&order()).await;

        assert!(outcome.is_success());
        assert!(outcome.get_str(KEY_TRANSACTION_ID).unwrap().starts_with("pi_mock_"));
        assert_eq!(gateway.call_count("charge"), 1);
    }

    #[tokio::test]
    async fn scripted_answers_are_consumed_in_order() {
        let gateway = MockPaymentGateway::new();
        gateway.script(
            "charge",
            Outcome::failure("Your card was declined.", FailureCode::CardDeclined),
        );

        assert!(gateway.charge(&order()).await.is_failure());
        assert!(gateway.charge(&order()).await.is_success());
    }

    #[tokio::test]
    async fn created_customers_can_be_fetched() {
        let gateway = MockPaymentGateway::new();
        let user = BillingUser {
            id: UserId::new(1),
            email: "a@example.com".to_string(),
            display_name: None,
            login: "alice".to_string(),
        };

        let outcome = gateway.create_customer(&user, Some("pm_1")).await;
        let id = outcome.get_str(KEY_CUSTOMER_ID).unwrap().to_string();
        let customer = gateway.get_customer(&id).await.unwrap();

        assert_eq!(customer.name.as_deref(), Some("alice"));
        assert_eq!(gateway.calls()[0].args, vec!["1".to_string(), "pm_1".to_string()]);
    }

    #[tokio::test]
    async fn refund_defaults_to_order_total() {
        let gateway = MockPaymentGateway::new();
        let outcome = gateway.refund(&order(), None).await;
        assert_eq!(outcome.get_str(KEY_AMOUNT), Some("10.00"));
    }
}
