//! Stripe API response shapes used by the gateway.
//!
//! Only fields the gateway reads are captured.

use serde::Deserialize;

/// Error envelope returned with non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeErrorEnvelope {
    #[serde(default)]
    pub error: StripeApiError,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeApiError {
    /// `card_error`, `invalid_request_error`, `api_error`, ...
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub decline_code: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

impl StripeApiError {
    pub fn is_card_error(&self) -> bool {
        self.kind.as_deref() == Some("card_error")
    }

    pub fn is_invalid_request(&self) -> bool {
        self.kind.as_deref() == Some("invalid_request_error")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: String,
    /// Minor units.
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Coupon {
    pub id: String,
}
