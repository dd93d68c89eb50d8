//! Email service that records messages instead of sending them.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{EmailMessage, EmailService};

/// A message handed to [`RecordingEmailService`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub template_key: String,
    pub recipient: String,
    pub message: EmailMessage,
}

#[derive(Debug, Default)]
struct State {
    sent: Vec<SentEmail>,
    fail_next: usize,
}

#[derive(Debug, Default)]
pub struct RecordingEmailService {
    state: Mutex<State>,
}

impl RecordingEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.lock().sent.clone()
    }

    pub fn sent_with_template(&self, template_key: &str) -> Vec<SentEmail> {
        self.lock()
            .sent
            .iter()
            .filter(|e| e.template_key == template_key)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl EmailService for RecordingEmailService {
    async fn send(
        &self,
        template_key: &str,
        recipient: &str,
        message: &EmailMessage,
    ) -> Result<(), DomainError> {
        let mut state = self.lock();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(DomainError::new(
                ErrorCode::InternalError,
                format!("Mail transport refused {}", template_key),
            ));
        }
        state.sent.push(SentEmail {
            template_key: template_key.to_string(),
            recipient: recipient.to_string(),
            message: message.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{TEMPLATE_MEMBERSHIP_EXPIRED, TEMPLATE_PAYMENT_FAILED};

    #[tokio::test]
    async fn records_sent_messages_by_template() {
        let email = RecordingEmailService::new();
        let message = EmailMessage::new().subject("Expired").data("level_id", 7);

        email
            .send(TEMPLATE_MEMBERSHIP_EXPIRED, "a@example.com", &message)
            .await
            .unwrap();

        let sent = email.sent_with_template(TEMPLATE_MEMBERSHIP_EXPIRED);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "a@example.com");
        assert_eq!(sent[0].message.data["level_id"], 7);
        assert!(email.sent_with_template(TEMPLATE_PAYMENT_FAILED).is_empty());
    }

    #[tokio::test]
    async fn injected_failures_are_not_recorded() {
        let email = RecordingEmailService::new();
        email.fail_next(1);

        assert!(email
            .send(TEMPLATE_PAYMENT_FAILED, "a@example.com", &EmailMessage::new())
            .await
            .is_err());
        assert!(email
            .send(TEMPLATE_PAYMENT_FAILED, "a@example.com", &EmailMessage::new())
            .await
            .is_ok());
        assert_eq!(email.sent().len(), 1);
    }
}
