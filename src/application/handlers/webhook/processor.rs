//! WebhookProcessor - Verifies, claims and dispatches webhook deliveries.
//!
//! ## Ordering
//!
//! 1. Verify the signature and parse the event
//! 2. Claim the event id in the idempotency store
//! 3. Dispatch to the event handler
//! 4. Release the claim when the handler failed with a retryable error
//!
//! Claiming before any side effect means two concurrent deliveries of the
//! same event run the handler once; the loser reports `Duplicate`.

use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;

use crate::domain::foundation::DomainError;
use crate::domain::webhook::{WebhookError, WebhookEvent};
use crate::ports::{IdempotencyStore, SaveResult, WebhookVerifier};

/// Business handling of a verified, claimed event.
///
/// Returns `Err(WebhookError::Ignored(_))` for events that are
/// acknowledged without side effects.
#[async_trait]
pub trait WebhookEventHandler: Send + Sync {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), WebhookError>;
}

/// How a delivery was disposed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Processed,
    Duplicate,
    Ignored,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Processed => "processed",
            ReceiptStatus::Duplicate => "duplicate",
            ReceiptStatus::Ignored => "ignored",
        }
    }
}

/// Result of a successfully acknowledged delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookReceipt {
    pub event_id: String,
    pub event_type: String,
    pub status: ReceiptStatus,
}

/// Entry point for one provider's webhooks.
pub struct WebhookProcessor {
    gateway: String,
    secret: SecretString,
    verifier: Arc<dyn WebhookVerifier>,
    store: Arc<dyn IdempotencyStore>,
    handler: Arc<dyn WebhookEventHandler>,
}

impl WebhookProcessor {
    pub fn new(
        gateway: impl Into<String>,
        secret: SecretString,
        verifier: Arc<dyn WebhookVerifier>,
        store: Arc<dyn IdempotencyStore>,
        handler: Arc<dyn WebhookEventHandler>,
    ) -> Self {
        Self {
            gateway: gateway.into(),
            secret,
            verifier,
            store,
            handler,
        }
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// Processes one delivery.
    ///
    /// # Errors
    ///
    /// - Verification and parse errors (never retryable)
    /// - `Storage` when the idempotency store is unavailable
    /// - Whatever the handler returned, claim released when retryable
    pub async fn process(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookReceipt, WebhookError> {
        self.verifier
            .check(payload, headers, self.secret.expose_secret())?;
        let event = self.verifier.parse_event(payload)?;

        let event_id = self.verifier.event_id(&event).to_string();
        let event_type = self.verifier.event_type(&event).to_string();
        let receipt = |status| WebhookReceipt {
            event_id: event_id.clone(),
            event_type: event_type.clone(),
            status,
        };

        if self
            .store
            .has_processed(&self.gateway, &event_id)
            .await
            .map_err(storage_error)?
        {
            tracing::debug!(event_id = %event_id, "Webhook already processed");
            return Ok(receipt(ReceiptStatus::Duplicate));
        }

        let claim = self
            .store
            .mark_processed(&self.gateway, &event_id, &json!({ "event_type": event_type }))
            .await
            .map_err(storage_error)?;
        if claim == SaveResult::AlreadyExists {
            tracing::debug!(event_id = %event_id, "Webhook claimed by a concurrent delivery");
            return Ok(receipt(ReceiptStatus::Duplicate));
        }

        match self.handler.handle(&event).await {
            Ok(()) => {
                tracing::info!(event_id = %event_id, event_type = %event_type, "Webhook processed");
                Ok(receipt(ReceiptStatus::Processed))
            }
            Err(WebhookError::Ignored(reason)) => {
                tracing::info!(event_id = %event_id, event_type = %event_type, reason = %reason, "Webhook ignored");
                Ok(receipt(ReceiptStatus::Ignored))
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(event_id = %event_id, error = %err, "Webhook failed, releasing claim");
                if let Err(release_err) = self.store.release(&self.gateway, &event_id).await {
                    tracing::error!(
                        event_id = %event_id,
                        error = %release_err,
                        "Failed to release webhook claim"
                    );
                }
                Err(err)
            }
            Err(err) => {
                tracing::warn!(event_id = %event_id, event_type = %event_type, error = %err, "Webhook rejected");
                Err(err)
            }
        }
    }
}

fn storage_error(err: DomainError) -> WebhookError {
    WebhookError::Storage(err.to_string())
}
