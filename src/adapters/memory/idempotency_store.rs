//! In-memory idempotency store.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{IdempotencyStore, ProcessedEvent, SaveResult};

#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    events: Mutex<HashMap<(String, String), ProcessedEvent>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn get(&self, gateway: &str, event_id: &str) -> Option<ProcessedEvent> {
        self.events
            .lock()
            .await
            .get(&(gateway.to_string(), event_id.to_string()))
            .cloned()
    }

    /// Stores a record with an explicit processing time.
    pub async fn backdate(&self, gateway: &str, event_id: &str, processed_at: Timestamp) {
        self.events.lock().await.insert(
            (gateway.to_string(), event_id.to_string()),
            ProcessedEvent {
                gateway: gateway.to_string(),
                event_id: event_id.to_string(),
                processed_at,
                metadata: Value::Null,
            },
        );
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn has_processed(&self, gateway: &str, event_id: &str) -> Result<bool, DomainError> {
        Ok(self
            .events
            .lock()
            .await
            .contains_key(&(gateway.to_string(), event_id.to_string())))
    }

    async fn mark_processed(
        &self,
        gateway: &str,
        event_id: &str,
        metadata: &Value,
    ) -> Result<SaveResult, DomainError> {
        let mut events = self.events.lock().await;
        let key = (gateway.to_string(), event_id.to_string());
        if events.contains_key(&key) {
            return Ok(SaveResult::AlreadyExists);
        }
        events.insert(
            key,
            ProcessedEvent {
                gateway: gateway.to_string(),
                event_id: event_id.to_string(),
                processed_at: Timestamp::now(),
                metadata: metadata.clone(),
            },
        );
        Ok(SaveResult::Inserted)
    }

    async fn release(&self, gateway: &str, event_id: &str) -> Result<(), DomainError> {
        self.events
            .lock()
            .await
            .remove(&(gateway.to_string(), event_id.to_string()));
        Ok(())
    }

    async fn cleanup(&self, days_old: u32) -> Result<u64, DomainError> {
        let cutoff = *Timestamp::now().as_datetime() - Duration::days(i64::from(days_old));
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|_, e| *e.processed_at.as_datetime() >= cutoff);
        Ok((before - events.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn has_processed_is_false_for_new_event() {
        let store = InMemoryIdempotencyStore::new();
        assert!(!store.has_processed("stripe", "evt_1").await.unwrap());
    }

    #[tokio::test]
    async fn mark_processed_claims_once() {
        let store = InMemoryIdempotencyStore::new();
        let meta = json!({"event_type": "charge.succeeded"});

        assert_eq!(
            store.mark_processed("stripe", "evt_1", &meta).await.unwrap(),
            SaveResult::Inserted
        );
        assert_eq!(
            store.mark_processed("stripe", "evt_1", &meta).await.unwrap(),
            SaveResult::AlreadyExists
        );
        assert!(store.has_processed("stripe", "evt_1").await.unwrap());
        assert_eq!(
            store.get("stripe", "evt_1").await.unwrap().metadata["event_type"],
            "charge.succeeded"
        );
    }

    #[tokio::test]
    async fn same_event_id_on_other_gateway_is_distinct() {
        let store = InMemoryIdempotencyStore::new();
        store.mark_processed("stripe", "evt_1", &Value::Null).await.unwrap();
        assert_eq!(
            store.mark_processed("paypal", "evt_1", &Value::Null).await.unwrap(),
            SaveResult::Inserted
        );
    }

    #[tokio::test]
    async fn release_allows_reclaim() {
        let store = InMemoryIdempotencyStore::new();
        store.mark_processed("stripe", "evt_1", &Value::Null).await.unwrap();
        store.release("stripe", "evt_1").await.unwrap();
        assert_eq!(
            store.mark_processed("stripe", "evt_1", &Value::Null).await.unwrap(),
            SaveResult::Inserted
        );
    }

    #[tokio::test]
    async fn cleanup_removes_only_old_records() {
        let store = InMemoryIdempotencyStore::new();
        store.backdate("stripe", "evt_old", Timestamp::now().minus_days(40)).await;
        store.mark_processed("stripe", "evt_new", &Value::Null).await.unwrap();

        assert_eq!(store.cleanup(30).await.unwrap(), 1);
        assert!(!store.has_processed("stripe", "evt_old").await.unwrap());
        assert!(store.has_processed("stripe", "evt_new").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let store = Arc::new(InMemoryIdempotencyStore::new());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.mark_processed("stripe", "evt_race", &Value::Null).await
            }));
        }
        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_inserted() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
    }
}
