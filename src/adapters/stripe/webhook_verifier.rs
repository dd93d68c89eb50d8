//! Stripe webhook verifier.
//!
//! # Security
//!
//! - HMAC-SHA256 over `"{t}.{payload}"`, compared in constant time against
//!   every `v1` signature in the header
//! - Timestamps older than the tolerance, or more than 60 seconds in the
//!   future, are rejected

use http::HeaderMap;

use crate::domain::webhook::{
    verify_signature, WebhookError, WebhookEvent, DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER,
};
use crate::ports::WebhookVerifier;

/// Verifies `Stripe-Signature` headers and parses event payloads.
#[derive(Debug, Clone)]
pub struct StripeWebhookVerifier {
    tolerance_secs: i64,
    require_livemode: bool,
}

impl Default for StripeWebhookVerifier {
    fn default() -> Self {
        Self {
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            require_livemode: false,
        }
    }
}

impl StripeWebhookVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Rejects test-mode events (live deployments).
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

impl WebhookVerifier for StripeWebhookVerifier {
    fn check(&self, payload: &[u8], headers: &HeaderMap, secret: &str) -> Result<(), WebhookError> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .ok_or(WebhookError::MissingSignature)?
            .to_str()
            .map_err(|_| WebhookError::ParseError("Signature header is not ASCII".to_string()))?;

        let now = chrono::Utc::now().timestamp();
        verify_signature(payload, header, secret, self.tolerance_secs, now).map_err(|err| {
            tracing::warn!(error = %err, "Webhook signature rejected");
            err
        })
    }

    fn parse_event(&self, payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
        let event: WebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse webhook payload");
            WebhookError::ParseError(format!("Invalid JSON: {}", e))
        })?;

        if event.id.trim().is_empty() {
            return Err(WebhookError::ParseError("Event id is empty".to_string()));
        }
        if event.event_type.trim().is_empty() {
            return Err(WebhookError::ParseError("Event type is empty".to_string()));
        }

        if self.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event");
            return Err(WebhookError::ParseError(
                "Test mode events are not accepted".to_string(),
            ));
        }

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::sign_payload;
    use http::HeaderValue;

    const SECRET: &str = "whsec_test_secret";
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"charge.succeeded","data":{"object":{}}}"#;

    fn headers_for(secret: &str, timestamp: i64, payload: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = sign_payload(secret, timestamp, payload).unwrap();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&value).unwrap());
        headers
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    // ══════════════════════════════════════════════════════════════
    // Signature checks
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn accepts_valid_signature() {
        let verifier = StripeWebhookVerifier::new();
        let headers = headers_for(SECRET, now(), PAYLOAD);
        assert!(verifier.verify(PAYLOAD, &headers, SECRET));
    }

    #[test]
    fn rejects_wrong_secret() {
        let verifier = StripeWebhookVerifier::new();
        let headers = headers_for("whsec_other", now(), PAYLOAD);
        assert!(matches!(
            verifier.check(PAYLOAD, &headers, SECRET),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_tampered_payload() {
        let verifier = StripeWebhookVerifier::new();
        let headers = headers_for(SECRET, now(), PAYLOAD);
        assert!(!verifier.verify(br#"{"id":"evt_2"}"#, &headers, SECRET));
    }

    #[test]
    fn rejects_missing_header() {
        let verifier = StripeWebhookVerifier::new();
        assert!(matches!(
            verifier.check(PAYLOAD, &HeaderMap::new(), SECRET),
            Err(WebhookError::MissingSignature)
        ));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let verifier = StripeWebhookVerifier::new();
        let headers = headers_for(SECRET, now() - 301, PAYLOAD);
        assert!(matches!(
            verifier.check(PAYLOAD, &headers, SECRET),
            Err(WebhookError::TimestampOutOfRange)
        ));
    }

    #[test]
    fn custom_tolerance_widens_window() {
        let verifier = StripeWebhookVerifier::new().with_tolerance_secs(900);
        let headers = headers_for(SECRET, now() - 600, PAYLOAD);
        assert!(verifier.verify(PAYLOAD, &headers, SECRET));
    }

    #[test]
    fn rejects_far_future_timestamp() {
        let verifier = StripeWebhookVerifier::new();
        let headers = headers_for(SECRET, now() + 120, PAYLOAD);
        assert!(matches!(
            verifier.check(PAYLOAD, &headers, SECRET),
            Err(WebhookError::InvalidTimestamp)
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parses_event_and_exposes_accessors() {
        let verifier = StripeWebhookVerifier::new();
        let event = verifier.parse_event(PAYLOAD).unwrap();
        assert_eq!(verifier.event_id(&event), "evt_1");
        assert_eq!(verifier.event_type(&event), "charge.succeeded");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let verifier = StripeWebhookVerifier::new();
        assert!(matches!(
            verifier.parse_event(b"{not json"),
            Err(WebhookError::ParseError(_))
        ));
    }

    #[test]
    fn missing_type_is_a_parse_error() {
        let verifier = StripeWebhookVerifier::new();
        assert!(matches!(
            verifier.parse_event(br#"{"id":"evt_1"}"#),
            Err(WebhookError::ParseError(_))
        ));
    }

    #[test]
    fn livemode_requirement_rejects_test_events() {
        let verifier = StripeWebhookVerifier::new().with_require_livemode(true);
        assert!(verifier.parse_event(PAYLOAD).is_err());
    }
}
