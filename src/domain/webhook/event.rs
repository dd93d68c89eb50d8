//! Normalized webhook event envelope.
//!
//! Only the fields the handlers use are captured; the rest of the
//! provider's schema is ignored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A parsed webhook event.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebhookEvent {
    /// Provider event id (`evt_...`), the idempotency key.
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp of event creation.
    #[serde(default)]
    pub created: i64,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default)]
    pub api_version: Option<String>,

    #[serde(default)]
    pub data: WebhookEventData,
}

/// Container for the object the event is about.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WebhookEventData {
    #[serde(default)]
    pub object: serde_json::Value,

    /// Previous values of changed attributes (update events only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

impl WebhookEvent {
    /// Parses the event type into a known variant.
    pub fn kind(&self) -> StripeEventType {
        StripeEventType::parse(&self.event_type)
    }

    /// Deserializes the data object as `T`.
    pub fn deserialize_object<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data.object)
    }
}

/// Stripe event types the billing core reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StripeEventType {
    ChargeSucceeded,
    ChargeFailed,
    ChargeRefunded,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    InvoiceFinalized,
    InvoiceUpdated,
    CustomerSubscriptionUpdated,
    CustomerSubscriptionDeleted,
    /// Legacy spelling some integrations still send.
    CustomerSubscriptionCanceled,
    Unknown,
}

impl StripeEventType {
    pub fn parse(s: &str) -> Self {
        match s {
            "charge.succeeded" => Self::ChargeSucceeded,
            "charge.failed" => Self::ChargeFailed,
            "charge.refunded" => Self::ChargeRefunded,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "invoice.finalized" => Self::InvoiceFinalized,
            "invoice.updated" => Self::InvoiceUpdated,
            "customer.subscription.updated" => Self::CustomerSubscriptionUpdated,
            "customer.subscription.deleted" => Self::CustomerSubscriptionDeleted,
            "customer.subscription.canceled" => Self::CustomerSubscriptionCanceled,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChargeSucceeded => "charge.succeeded",
            Self::ChargeFailed => "charge.failed",
            Self::ChargeRefunded => "charge.refunded",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::InvoiceFinalized => "invoice.finalized",
            Self::InvoiceUpdated => "invoice.updated",
            Self::CustomerSubscriptionUpdated => "customer.subscription.updated",
            Self::CustomerSubscriptionDeleted => "customer.subscription.deleted",
            Self::CustomerSubscriptionCanceled => "customer.subscription.canceled",
            Self::Unknown => "unknown",
        }
    }
}

/// Builder for test events.
#[cfg(test)]
pub struct WebhookEventBuilder {
    event: WebhookEvent,
}

#[cfg(test)]
impl WebhookEventBuilder {
    pub fn new(event_type: StripeEventType) -> Self {
        Self {
            event: WebhookEvent {
                id: "evt_test_123".to_string(),
                event_type: event_type.as_str().to_string(),
                created: chrono::Utc::now().timestamp(),
                livemode: false,
                api_version: Some("2023-10-16".to_string()),
                data: WebhookEventData::default(),
            },
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.event.id = id.into();
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.event.data.object = object;
        self
    }

    pub fn build(self) -> WebhookEvent {
        self.event
    }
}
