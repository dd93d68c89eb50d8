//! Outcome value object returned by every gateway operation.
//!
//! An `Outcome` is either a success carrying an optional message and a
//! key/value data map, or a failure carrying a message, a stable
//! [`FailureCode`] and the same data map. Callers never see raw provider
//! errors; adapters translate them into one of the codes below.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Stable failure codes exposed to callers of a payment gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// Authorize or charge attempted without a payment method reference.
    MissingPaymentMethod,
    /// Void or refund attempted on an order with no payment transaction id.
    MissingTransactionId,
    /// The card was declined while charging.
    CardDeclined,
    /// The card was rejected while authorizing.
    CardError,
    /// Network failure, timeout, or unexpected provider failure.
    GatewayError,
    /// No gateway customer and no site user to create one from.
    UserNotFound,
    /// A recurring price could not be created.
    PriceError,
    /// The request was rejected as malformed by the provider.
    InvalidRequest,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::MissingPaymentMethod => "missing_payment_method",
            FailureCode::MissingTransactionId => "missing_transaction_id",
            FailureCode::CardDeclined => "card_declined",
            FailureCode::CardError => "card_error",
            FailureCode::GatewayError => "gateway_error",
            FailureCode::UserNotFound => "user_not_found",
            FailureCode::PriceError => "price_error",
            FailureCode::InvalidRequest => "invalid_request",
        }
    }

    /// Returns true if the same call may succeed when retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureCode::GatewayError)
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success or failure of a gateway call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        message: Option<String>,
        #[serde(default)]
        data: BTreeMap<String, Value>,
    },
    Failure {
        message: String,
        error_code: FailureCode,
        #[serde(default)]
        data: BTreeMap<String, Value>,
    },
}

impl Outcome {
    /// Creates a success without message or data.
    pub fn success() -> Self {
        Outcome::Success {
            message: None,
            data: BTreeMap::new(),
        }
    }

    /// Creates a success with a message.
    pub fn success_with_message(message: impl Into<String>) -> Self {
        Outcome::Success {
            message: Some(message.into()),
            data: BTreeMap::new(),
        }
    }

    /// Creates a failure with a message and code.
    pub fn failure(message: impl Into<String>, error_code: FailureCode) -> Self {
        Outcome::Failure {
            message: message.into(),
            error_code,
            data: BTreeMap::new(),
        }
    }

    /// Adds a data entry while the outcome is being built.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self {
            Outcome::Success { data, .. } | Outcome::Failure { data, .. } => {
                data.insert(key.into(), value.into());
            }
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Success { message, .. } => message.as_deref(),
            Outcome::Failure { message, .. } => Some(message),
        }
    }

    /// Returns the failure code, `None` for successes.
    pub fn error_code(&self) -> Option<FailureCode> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { error_code, .. } => Some(*error_code),
        }
    }

    pub fn data(&self) -> &BTreeMap<String, Value> {
        match self {
            Outcome::Success { data, .. } | Outcome::Failure { data, .. } => data,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data().get(key)
    }

    /// Returns a data entry when it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_carries_data() {
        let outcome = Outcome::success()
            .with("transaction_id", "ch_1")
            .with("status", "succeeded");

        assert!(outcome.is_success());
        assert_eq!(outcome.get_str("transaction_id"), Some("ch_1"));
        assert_eq!(outcome.error_code(), None);
        assert_eq!(outcome.message(), None);
    }

    #[test]
    fn failure_carries_code_and_message() {
        let outcome = Outcome::failure("Your card was declined.", FailureCode::CardDeclined);

        assert!(outcome.is_failure());
        assert_eq!(outcome.error_code(), Some(FailureCode::CardDeclined));
        assert_eq!(outcome.message(), Some("Your card was declined."));
    }

    #[test]
    fn get_str_ignores_non_string_values() {
        let outcome = Outcome::success().with("amount", 10);
        assert_eq!(outcome.get_str("amount"), None);
        assert_eq!(outcome.get("amount"), Some(&json!(10)));
    }

    #[test]
    fn failure_code_serializes_snake_case() {
        let json = serde_json::to_value(FailureCode::MissingPaymentMethod).unwrap();
        assert_eq!(json, json!("missing_payment_method"));
        assert_eq!(FailureCode::GatewayError.to_string(), "gateway_error");
    }

    #[test]
    fn outcome_serializes_with_result_tag() {
        let outcome = Outcome::failure("boom", FailureCode::GatewayError);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "failure");
        assert_eq!(json["error_code"], "gateway_error");
    }

    #[test]
    fn only_gateway_errors_are_retryable() {
        assert!(FailureCode::GatewayError.is_retryable());
        assert!(!FailureCode::CardDeclined.is_retryable());
        assert!(!FailureCode::MissingTransactionId.is_retryable());
    }
}
