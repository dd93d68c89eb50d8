//! Webhook error types.
//!
//! Defines every error condition of webhook processing, with HTTP status
//! mapping and retryability semantics.

use http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No signature header was sent.
    #[error("Missing signature header")]
    MissingSignature,

    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required metadata missing; the event can't be tied to a user or order.
    #[error("Missing metadata: {0}")]
    MissingMetadata(&'static str),

    /// Required field missing from the event object.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Event was intentionally ignored (not an error condition).
    #[error("Event ignored: {0}")]
    Ignored(String),

    /// Idempotency storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A repository call failed.
    #[error("{0}")]
    Domain(#[from] DomainError),
}

impl WebhookError {
    /// Returns true if the provider should retry delivering this webhook.
    ///
    /// Retryable errors are temporary (storage outages, lost
    /// optimistic-concurrency races).
    pub fn is_retryable(&self) -> bool {
        match self {
            WebhookError::Storage(_) => true,
            WebhookError::Domain(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Maps the error to an HTTP status code.
    ///
    /// Status codes determine the provider's retry behavior:
    /// - 2xx: Event acknowledged, no retry
    /// - 4xx: Client error, no retry
    /// - 5xx: Server error, will retry
    pub fn status_code(&self) -> StatusCode {
        if self.is_retryable() {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        match self {
            WebhookError::Ignored(_) => StatusCode::OK,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;

    // ══════════════════════════════════════════════════════════════
    // Error Display Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parse_error_displays_message() {
        let err = WebhookError::ParseError("invalid JSON".to_string());
        assert_eq!(format!("{}", err), "Parse error: invalid JSON");
    }

    #[test]
    fn missing_metadata_displays_field_name() {
        let err = WebhookError::MissingMetadata("user_id");
        assert_eq!(format!("{}", err), "Missing metadata: user_id");
    }

    #[test]
    fn domain_error_displays_code() {
        let err: WebhookError = DomainError::new(ErrorCode::OrderNotFound, "gone").into();
        assert_eq!(format!("{}", err), "[ORDER_NOT_FOUND] gone");
    }

    // ══════════════════════════════════════════════════════════════
    // Retryability Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn storage_error_is_retryable() {
        assert!(WebhookError::Storage("redis timeout".to_string()).is_retryable());
    }

    #[test]
    fn domain_error_retryability_follows_code() {
        let db: WebhookError = DomainError::database("insert", "connection reset").into();
        let cas: WebhookError =
            DomainError::new(ErrorCode::ConcurrentModification, "version moved").into();
        let transition: WebhookError =
            DomainError::new(ErrorCode::InvalidStateTransition, "no").into();

        assert!(db.is_retryable());
        assert!(cas.is_retryable());
        assert!(!transition.is_retryable());
    }

    #[test]
    fn verification_errors_are_not_retryable() {
        assert!(!WebhookError::InvalidSignature.is_retryable());
        assert!(!WebhookError::TimestampOutOfRange.is_retryable());
        assert!(!WebhookError::ParseError("bad".to_string()).is_retryable());
    }

    // ══════════════════════════════════════════════════════════════
    // Status Code Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn verification_failures_are_bad_requests() {
        assert_eq!(WebhookError::MissingSignature.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(WebhookError::InvalidSignature.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(WebhookError::TimestampOutOfRange.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(WebhookError::InvalidTimestamp.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn ignored_is_ok() {
        assert_eq!(
            WebhookError::Ignored("unhandled".to_string()).status_code(),
            StatusCode::OK
        );
    }

    #[test]
    fn retryable_errors_are_server_errors() {
        assert_eq!(
            WebhookError::Storage("down".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
