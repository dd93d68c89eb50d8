//! Email service that logs each message instead of delivering it.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::{EmailMessage, EmailService};

/// Logs emails through `tracing`, filling in the configured sender.
#[derive(Debug, Clone)]
pub struct TracingEmailService {
    from_address: String,
    from_name: Option<String>,
}

impl TracingEmailService {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
            from_name: None,
        }
    }

    pub fn with_from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = Some(name.into());
        self
    }

    /// The sender used when a message does not set one.
    pub fn sender(&self, message: &EmailMessage) -> String {
        if let Some(from) = &message.from {
            return from.clone();
        }
        match &self.from_name {
            Some(name) => format!("{} <{}>", name, self.from_address),
            None => self.from_address.clone(),
        }
    }
}

#[async_trait]
impl EmailService for TracingEmailService {
    async fn send(
        &self,
        template_key: &str,
        recipient: &str,
        message: &EmailMessage,
    ) -> Result<(), DomainError> {
        if recipient.trim().is_empty() {
            return Err(DomainError::validation("recipient", "Recipient is required"));
        }

        tracing::info!(
            template = template_key,
            recipient,
            from = %self.sender(message),
            subject = message.subject.as_deref().unwrap_or_default(),
            data_keys = message.data.len(),
            "Email dispatched"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::TEMPLATE_PAYMENT_FAILED;

    #[test]
    fn sender_prefers_message_then_named_default() {
        let service = TracingEmailService::new("billing@example.com").with_from_name("KHM");
        assert_eq!(
            service.sender(&EmailMessage::new()),
            "KHM <billing@example.com>"
        );
        assert_eq!(
            service.sender(&EmailMessage::new().from_address("other@example.com")),
            "other@example.com"
        );
    }

    #[tokio::test]
    async fn send_rejects_blank_recipient() {
        let service = TracingEmailService::new("billing@example.com");
        let message = EmailMessage::new().subject("Payment failed");

        assert!(service
            .send(TEMPLATE_PAYMENT_FAILED, "member@example.com", &message)
            .await
            .is_ok());
        assert!(service
            .send(TEMPLATE_PAYMENT_FAILED, "  ", &message)
            .await
            .is_err());
    }
}
