//! IdempotencyStore port - Tracks processed webhook events.
//!
//! Providers may deliver the same webhook multiple times:
//! - Network timeouts
//! - 5xx response from our endpoint (triggers retry)
//! - Our endpoint returning success but the provider not receiving it
//!
//! The store is keyed on `(gateway, event_id)`. `mark_processed` is the
//! atomic claim: implementations must rely on a storage-level uniqueness
//! guarantee, never on a read-then-write.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::foundation::{DomainError, Timestamp};

/// Record of a processed webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedEvent {
    pub gateway: String,
    pub event_id: String,
    pub processed_at: Timestamp,
    /// At least `{"event_type": ...}`.
    pub metadata: Value,
}

/// Result of attempting to claim an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was inserted (first time seeing this event).
    Inserted,
    /// Record already exists (duplicate event).
    AlreadyExists,
}

impl SaveResult {
    pub fn is_inserted(&self) -> bool {
        matches!(self, SaveResult::Inserted)
    }
}

/// Port for at-most-once webhook side effects.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Fast-path check; not a substitute for the claim.
    async fn has_processed(&self, gateway: &str, event_id: &str) -> Result<bool, DomainError>;

    /// Claims an event.
    ///
    /// Returns `AlreadyExists` when another delivery claimed it first.
    async fn mark_processed(
        &self,
        gateway: &str,
        event_id: &str,
        metadata: &Value,
    ) -> Result<SaveResult, DomainError>;

    /// Drops a claim so a retried delivery can be processed.
    async fn release(&self, gateway: &str, event_id: &str) -> Result<(), DomainError>;

    /// Purges records older than `days_old` days, returning how many went.
    async fn cleanup(&self, days_old: u32) -> Result<u64, DomainError>;
}
