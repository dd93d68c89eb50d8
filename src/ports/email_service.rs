//! EmailService port - Templated member notifications.
//!
//! Rendering and delivery live outside the billing core; this port only
//! names a template and passes the data it needs.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::foundation::DomainError;

pub const TEMPLATE_MEMBERSHIP_CANCELLED: &str = "membership_cancelled";
pub const TEMPLATE_MEMBERSHIP_EXPIRED: &str = "membership_expired";
pub const TEMPLATE_MEMBERSHIP_EXPIRING: &str = "membership_expiring";
pub const TEMPLATE_PAYMENT_FAILED: &str = "payment_failed";

/// Everything needed to send one email, in a single struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmailMessage {
    pub subject: Option<String>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Values substituted into the template.
    pub data: BTreeMap<String, Value>,
}

impl EmailMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn from_address(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send(
        &self,
        template_key: &str,
        recipient: &str,
        message: &EmailMessage,
    ) -> Result<(), DomainError>;
}
