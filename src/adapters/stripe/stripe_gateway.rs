//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` port against the Stripe REST API.
//! Requests are form-encoded and authenticated with the secret key as the
//! basic-auth user. Every failure, including timeouts, is folded into an
//! [`Outcome::Failure`] with a stable [`FailureCode`].
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key).with_timeout(Duration::from_secs(20));
//! let gateway = StripeGateway::new(config, users)?;
//! ```

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{BillingUser, FailureCode, GatewayEnvironment, Outcome};
use crate::domain::foundation::{Currency, Money};
use crate::domain::order::{BillingPlan, Coupon, Discount, Order};
use crate::domain::webhook::StripeSubscription;
use crate::ports::{
    Customer, PaymentGateway, SubscriptionUpdate, UserDirectory, KEY_AMOUNT, KEY_CUSTOMER_ID,
    KEY_REFUND_ID, KEY_STATUS, KEY_SUBSCRIPTION_ID, KEY_TRANSACTION_ID,
};

use super::api_types as api;

/// Gateway name recorded on orders and idempotency records.
pub const GATEWAY_NAME: &str = "stripe";

pub const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

type Params = Vec<(String, String)>;

/// Stripe API configuration.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_live_...` or `sk_test_...`).
    api_key: SecretString,

    api_base_url: String,

    timeout: Duration,

    environment: GatewayEnvironment,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            environment: GatewayEnvironment::Sandbox,
        }
    }

    /// Points the client at another host (local mocks).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_environment(mut self, environment: GatewayEnvironment) -> Self {
        self.environment = environment;
        self
    }
}

/// Why a Stripe request did not produce the expected object.
#[derive(Debug)]
enum ApiFailure {
    Transport { message: String, timeout: bool },
    Api { status: StatusCode, error: api::StripeApiError },
    Decode(String),
}

/// Stripe implementation of `PaymentGateway`.
pub struct StripeGateway {
    config: StripeConfig,
    http_client: reqwest::Client,
    users: Arc<dyn UserDirectory>,
}

impl StripeGateway {
    /// Builds the HTTP client with the configured timeout.
    pub fn new(config: StripeConfig, users: Arc<dyn UserDirectory>) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            http_client,
            users,
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, ApiFailure> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let mut request = self
            .http_client
            .request(method.clone(), &url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None);

        if !params.is_empty() {
            request = if method == Method::GET {
                request.query(params)
            } else {
                request.form(params)
            };
        }

        let response = request.send().await.map_err(|e| ApiFailure::Transport {
            timeout: e.is_timeout(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let envelope = response
                .json::<api::StripeErrorEnvelope>()
                .await
                .unwrap_or_default();
            return Err(ApiFailure::Api {
                status,
                error: envelope.error,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiFailure::Decode(e.to_string()))
    }

    async fn payment_intent(&self, order: &Order, manual_capture: bool) -> Outcome {
        let (operation, card_code) = if manual_capture {
            ("authorize", FailureCode::CardError)
        } else {
            ("charge", FailureCode::CardDeclined)
        };

        let Some(payment_method) = order.checkout.payment_method_id.as_deref() else {
            return Outcome::failure("No payment method provided", FailureCode::MissingPaymentMethod);
        };
        let amount = match order.total.to_minor_units() {
            Ok(amount) => amount,
            Err(e) => return Outcome::failure(e.to_string(), FailureCode::InvalidRequest),
        };

        let mut params = vec![
            param("amount", amount),
            param("currency", order.currency.as_str()),
            param("payment_method", payment_method),
            param("confirm", "true"),
        ];
        if manual_capture {
            params.push(param("capture_method", "manual"));
        }
        if let Some(customer) = order.checkout.customer_id.as_deref() {
            params.push(param("customer", customer));
        }
        params.extend(order_params(order));

        match self
            .send::<api::PaymentIntent>(Method::POST, "/v1/payment_intents", &params)
            .await
        {
            Ok(intent) => {
                tracing::info!(
                    order_code = %order.code,
                    transaction_id = %intent.id,
                    status = %intent.status,
                    operation,
                    "Stripe payment intent created"
                );
                Outcome::success()
                    .with(KEY_TRANSACTION_ID, intent.id)
                    .with(KEY_STATUS, intent.status)
            }
            Err(failure) => failure_outcome(operation, failure, card_code),
        }
    }

    /// Reuses the order's customer when Stripe still knows it, else creates one.
    async fn ensure_customer(&self, order: &Order) -> Result<String, Outcome> {
        if let Some(customer_id) = order.checkout.customer_id.as_deref() {
            if self.get_customer(customer_id).await.is_some() {
                return Ok(customer_id.to_string());
            }
            tracing::info!(customer_id, "Stored Stripe customer is gone, creating a new one");
        }

        let user = match self.users.find_user(order.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return Err(Outcome::failure(
                    format!("User {} not found", order.user_id),
                    FailureCode::UserNotFound,
                ))
            }
            Err(err) => {
                tracing::error!(user_id = %order.user_id, error = %err, "User lookup failed");
                return Err(Outcome::failure(
                    "Could not load the user for this order",
                    FailureCode::GatewayError,
                ));
            }
        };

        let outcome = self
            .create_customer(&user, order.checkout.payment_method_id.as_deref())
            .await;
        if let (true, Some(id)) = (outcome.is_success(), outcome.get_str(KEY_CUSTOMER_ID)) {
            return Ok(id.to_string());
        }
        Err(outcome)
    }

    async fn create_price(&self, order: &Order, plan: &BillingPlan) -> Result<String, Outcome> {
        let unit_amount = plan
            .amount
            .to_minor_units()
            .map_err(|e| Outcome::failure(e.to_string(), FailureCode::PriceError))?;
        let product_name = order
            .checkout
            .level_name
            .clone()
            .unwrap_or_else(|| format!("Membership Level {}", order.level_id));

        let params = vec![
            param("unit_amount", unit_amount),
            param("currency", order.currency.as_str()),
            param("recurring[interval]", plan.period.as_str()),
            param("recurring[interval_count]", plan.frequency.max(1)),
            param("product_data[name]", product_name),
        ];

        self.send::<api::Price>(Method::POST, "/v1/prices", &params)
            .await
            .map(|price| price.id)
            .map_err(|failure| {
                tracing::warn!(order_code = %order.code, error = ?failure, "Stripe price creation failed");
                Outcome::failure("Could not create a recurring price", FailureCode::PriceError)
            })
    }

    /// Creates a coupon; failures are logged and the caller proceeds without it.
    async fn create_coupon(&self, coupon: &Coupon, currency: &Currency) -> Option<String> {
        let mut params = vec![
            param("duration", coupon.duration.as_str()),
            param("name", &coupon.code),
        ];
        match coupon.discount {
            Discount::Percent(rate) => params.push(param("percent_off", rate)),
            Discount::Amount(amount) => match amount.to_minor_units() {
                Ok(units) => {
                    params.push(param("amount_off", units));
                    params.push(param("currency", currency.as_str()));
                }
                Err(e) => {
                    tracing::warn!(coupon = %coupon.code, error = %e, "Coupon amount out of range");
                    return None;
                }
            },
        }

        match self.send::<api::Coupon>(Method::POST, "/v1/coupons", &params).await {
            Ok(created) => Some(created.id),
            Err(failure) => {
                tracing::warn!(coupon = %coupon.code, error = ?failure, "Stripe coupon creation failed");
                None
            }
        }
    }

    async fn subscription_call(
        &self,
        operation: &'static str,
        method: Method,
        subscription_id: &str,
        params: &[(String, String)],
    ) -> Outcome {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        match self.send::<StripeSubscription>(method, &path, params).await {
            Ok(subscription) => Outcome::success()
                .with(KEY_SUBSCRIPTION_ID, subscription.id)
                .with(KEY_STATUS, subscription.status),
            Err(failure) => failure_outcome(operation, failure, FailureCode::CardError),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn gateway_name(&self) -> &str {
        GATEWAY_NAME
    }

    fn environment(&self) -> GatewayEnvironment {
        self.config.environment
    }

    async fn authorize(&self, order: &Order) -> Outcome {
        self.payment_intent(order, true).await
    }

    async fn charge(&self, order: &Order) -> Outcome {
        self.payment_intent(order, false).await
    }

    async fn void(&self, order: &Order) -> Outcome {
        let Some(transaction_id) = order.payment_transaction_id.as_deref() else {
            return Outcome::failure("Order has no payment transaction", FailureCode::MissingTransactionId);
        };

        let path = format!("/v1/payment_intents/{}/cancel", transaction_id);
        match self.send::<api::PaymentIntent>(Method::POST, &path, &[]).await {
            Ok(intent) => Outcome::success()
                .with(KEY_TRANSACTION_ID, intent.id)
                .with(KEY_STATUS, intent.status),
            Err(failure) => failure_outcome("void", failure, FailureCode::CardError),
        }
    }

    async fn refund(&self, order: &Order, amount: Option<Money>) -> Outcome {
        let Some(transaction_id) = order.payment_transaction_id.as_deref() else {
            return Outcome::failure("Order has no payment transaction", FailureCode::MissingTransactionId);
        };

        let target = if transaction_id.starts_with("ch_") {
            "charge"
        } else {
            "payment_intent"
        };
        let mut params = vec![
            param(target, transaction_id),
            param("metadata[order_code]", &order.code),
        ];
        if let Some(amount) = amount {
            match amount.to_minor_units() {
                Ok(units) => params.push(param("amount", units)),
                Err(e) => return Outcome::failure(e.to_string(), FailureCode::InvalidRequest),
            }
        }

        match self.send::<api::Refund>(Method::POST, "/v1/refunds", &params).await {
            Ok(refund) => {
                tracing::info!(order_code = %order.code, refund_id = %refund.id, "Stripe refund created");
                Outcome::success()
                    .with(KEY_REFUND_ID, refund.id)
                    .with(KEY_AMOUNT, Money::from_minor_units(refund.amount).to_string())
                    .with(KEY_STATUS, refund.status.unwrap_or_else(|| "succeeded".to_string()))
            }
            Err(failure) => failure_outcome("refund", failure, FailureCode::CardError),
        }
    }

    async fn create_subscription(&self, order: &Order) -> Outcome {
        let Some(plan) = order.checkout.plan.as_ref() else {
            return Outcome::failure("Order has no billing plan", FailureCode::InvalidRequest);
        };

        let customer_id = match self.ensure_customer(order).await {
            Ok(id) => id,
            Err(outcome) => return outcome,
        };
        let price_id = match &plan.price_id {
            Some(id) => id.clone(),
            None => match self.create_price(order, plan).await {
                Ok(id) => id,
                Err(outcome) => return outcome,
            },
        };

        let mut params = vec![
            param("customer", &customer_id),
            param("items[0][price]", &price_id),
        ];
        if let Some(payment_method) = order.checkout.payment_method_id.as_deref() {
            params.push(param("default_payment_method", payment_method));
        }
        if plan.trial_days > 0 {
            params.push(param("trial_period_days", plan.trial_days));
        }
        if let Some(coupon) = order.checkout.coupon.as_ref() {
            if let Some(coupon_id) = self.create_coupon(coupon, &order.currency).await {
                params.push(param("coupon", coupon_id));
            }
        }
        params.extend(order_params(order));

        match self
            .send::<StripeSubscription>(Method::POST, "/v1/subscriptions", &params)
            .await
        {
            Ok(subscription) => {
                tracing::info!(
                    order_code = %order.code,
                    subscription_id = %subscription.id,
                    status = %subscription.status,
                    "Stripe subscription created"
                );
                Outcome::success()
                    .with(KEY_SUBSCRIPTION_ID, subscription.id)
                    .with(KEY_CUSTOMER_ID, customer_id)
                    .with(KEY_STATUS, subscription.status)
            }
            Err(failure) => failure_outcome("create_subscription", failure, FailureCode::CardDeclined),
        }
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: &SubscriptionUpdate,
    ) -> Outcome {
        if update.is_empty() {
            return Outcome::success_with_message("Nothing to update")
                .with(KEY_SUBSCRIPTION_ID, subscription_id);
        }

        let mut params: Params = Vec::new();
        if let Some(price_id) = update.price_id.as_deref() {
            // Swapping the price replaces the first item rather than adding one.
            let path = format!("/v1/subscriptions/{}", subscription_id);
            match self.send::<StripeSubscription>(Method::GET, &path, &[]).await {
                Ok(current) => {
                    if let Some(item_id) = current.items.data.first().and_then(|i| i.id.clone()) {
                        params.push(param("items[0][id]", item_id));
                    }
                }
                Err(failure) => return failure_outcome("update_subscription", failure, FailureCode::CardError),
            }
            params.push(param("items[0][price]", price_id));
        }
        if let Some(payment_method) = update.payment_method_id.as_deref() {
            params.push(param("default_payment_method", payment_method));
        }
        if let Some(at_period_end) = update.cancel_at_period_end {
            params.push(param("cancel_at_period_end", at_period_end));
        }
        for (key, value) in &update.metadata {
            params.push(param(&format!("metadata[{}]", key), value));
        }

        self.subscription_call("update_subscription", Method::POST, subscription_id, &params)
            .await
    }

    async fn cancel_subscription(&self, subscription_id: &str, at_period_end: bool) -> Outcome {
        if at_period_end {
            self.subscription_call(
                "cancel_subscription",
                Method::POST,
                subscription_id,
                &[param("cancel_at_period_end", "true")],
            )
            .await
        } else {
            self.subscription_call("cancel_subscription", Method::DELETE, subscription_id, &[])
                .await
        }
    }

    async fn get_customer(&self, customer_id: &str) -> Option<Customer> {
        let path = format!("/v1/customers/{}", customer_id);
        match self.send::<api::Customer>(Method::GET, &path, &[]).await {
            Ok(customer) if customer.deleted => None,
            Ok(customer) => Some(Customer {
                id: customer.id,
                email: customer.email,
                name: customer.name,
            }),
            Err(ApiFailure::Api {
                status: StatusCode::NOT_FOUND,
                ..
            }) => None,
            Err(failure) => {
                tracing::warn!(customer_id, error = ?failure, "Stripe customer lookup failed");
                None
            }
        }
    }

    async fn create_customer(
        &self,
        user: &BillingUser,
        payment_method_id: Option<&str>,
    ) -> Outcome {
        let mut params = vec![
            param("email", &user.email),
            param("name", user.name()),
            param("metadata[user_id]", user.id),
        ];
        if let Some(payment_method) = payment_method_id {
            params.push(param("payment_method", payment_method));
            params.push(param("invoice_settings[default_payment_method]", payment_method));
        }

        match self
            .send::<api::Customer>(Method::POST, "/v1/customers", &params)
            .await
        {
            Ok(customer) => Outcome::success().with(KEY_CUSTOMER_ID, customer.id),
            Err(failure) => failure_outcome("create_customer", failure, FailureCode::CardError),
        }
    }
}

fn param(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

/// `Membership Order[ - <level name>][ (<code>)]`
fn order_description(order: &Order) -> String {
    let mut description = String::from("Membership Order");
    if let Some(name) = order.checkout.level_name.as_deref().filter(|n| !n.trim().is_empty()) {
        description.push_str(" - ");
        description.push_str(name);
    }
    if !order.code.is_empty() {
        description.push_str(&format!(" ({})", order.code));
    }
    description
}

fn order_params(order: &Order) -> Params {
    vec![
        param("description", order_description(order)),
        param("metadata[order_id]", order.id),
        param("metadata[order_code]", &order.code),
        param("metadata[user_id]", order.user_id),
        param("metadata[membership_id]", order.level_id),
    ]
}

/// Maps a failed request to a stable failure code.
///
/// Card errors use `card_code`, which differs between authorize and charge.
fn failure_outcome(operation: &str, failure: ApiFailure, card_code: FailureCode) -> Outcome {
    let (message, code) = match &failure {
        ApiFailure::Transport { timeout: true, .. } => {
            ("Payment gateway timed out".to_string(), FailureCode::GatewayError)
        }
        ApiFailure::Transport { message, .. } => (
            format!("Payment gateway unreachable: {}", message),
            FailureCode::GatewayError,
        ),
        ApiFailure::Api { error, .. } if error.is_card_error() => (
            error
                .message
                .clone()
                .unwrap_or_else(|| "The card was declined".to_string()),
            card_code,
        ),
        ApiFailure::Api { error, .. } if error.is_invalid_request() => (
            error
                .message
                .clone()
                .unwrap_or_else(|| "The request was rejected".to_string()),
            FailureCode::InvalidRequest,
        ),
        ApiFailure::Api { .. } => ("Payment gateway error".to_string(), FailureCode::GatewayError),
        ApiFailure::Decode(detail) => (
            format!("Unexpected payment gateway response: {}", detail),
            FailureCode::GatewayError,
        ),
    };

    tracing::warn!(operation, error_code = %code, error = ?failure, "Stripe request failed");

    let mut outcome = Outcome::failure(message, code);
    if let ApiFailure::Api { error, .. } = failure {
        if let Some(decline_code) = error.decline_code.or(error.code) {
            outcome = outcome.with("decline_code", decline_code);
        }
    }
    outcome
}
