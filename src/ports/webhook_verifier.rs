//! WebhookVerifier port - Authenticates and parses inbound webhooks.

use http::HeaderMap;

use crate::domain::webhook::{WebhookError, WebhookEvent};

/// Port for a provider's webhook signature scheme.
pub trait WebhookVerifier: Send + Sync {
    /// Checks the signature, reporting why verification failed.
    fn check(&self, payload: &[u8], headers: &HeaderMap, secret: &str) -> Result<(), WebhookError>;

    /// Parses the payload into a normalized event.
    ///
    /// # Errors
    ///
    /// `ParseError` when the JSON is malformed or `id`/`type` are absent.
    fn parse_event(&self, payload: &[u8]) -> Result<WebhookEvent, WebhookError>;

    /// Returns true if the payload carries a valid signature.
    fn verify(&self, payload: &[u8], headers: &HeaderMap, secret: &str) -> bool {
        self.check(payload, headers, secret).is_ok()
    }

    fn event_id<'a>(&self, event: &'a WebhookEvent) -> &'a str {
        &event.id
    }

    fn event_type<'a>(&self, event: &'a WebhookEvent) -> &'a str {
        &event.event_type
    }
}
