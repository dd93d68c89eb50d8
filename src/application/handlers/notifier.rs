//! MemberNotifier - Sends templated emails to site users.
//!
//! Notifications never fail the flow that triggers them; delivery problems
//! are logged and reported as `false`.

use std::sync::Arc;

use serde_json::json;

use crate::domain::foundation::{LevelId, Timestamp, UserId};
use crate::ports::{EmailMessage, EmailService, UserDirectory};

/// Looks up the member's address and hands the message to the email port.
#[derive(Clone)]
pub struct MemberNotifier {
    email: Arc<dyn EmailService>,
    users: Arc<dyn UserDirectory>,
}

impl MemberNotifier {
    pub fn new(email: Arc<dyn EmailService>, users: Arc<dyn UserDirectory>) -> Self {
        Self { email, users }
    }

    /// Sends `template_key` to the user, returning whether it went out.
    pub async fn notify(&self, template_key: &str, user_id: UserId, message: EmailMessage) -> bool {
        let user = match self.users.find_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(user_id = %user_id, template = template_key, "No user to notify");
                return false;
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "User lookup failed, email skipped");
                return false;
            }
        };

        let message = message
            .data("display_name", user.name())
            .data("user_id", user_id.as_i64());

        match self.email.send(template_key, &user.email, &message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    template = template_key,
                    error = %e,
                    "Email delivery failed"
                );
                false
            }
        }
    }
}

/// Message carrying the level and, when known, the end date.
pub fn membership_message(
    subject: &str,
    level_id: LevelId,
    end_date: Option<Timestamp>,
) -> EmailMessage {
    let end_date = end_date.map(|d| d.as_datetime().to_rfc3339());
    EmailMessage::new()
        .subject(subject)
        .data("level_id", level_id.as_i64())
        .data("end_date", json!(end_date))
}
