//! PostgreSQL implementation of IdempotencyStore.
//!
//! The primary key on `(gateway, event_id)` makes the claim atomic; an
//! `ON CONFLICT DO NOTHING` insert that affects no row lost the race.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::foundation::DomainError;
use crate::ports::{IdempotencyStore, SaveResult};

/// PostgreSQL implementation of the IdempotencyStore port.
#[derive(Clone)]
pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn has_processed(&self, gateway: &str, event_id: &str) -> Result<bool, DomainError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM processed_webhook_events WHERE gateway = $1 AND event_id = $2)",
        )
        .bind(gateway)
        .bind(event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to check processed event", e))
    }

    async fn mark_processed(
        &self,
        gateway: &str,
        event_id: &str,
        metadata: &Value,
    ) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (gateway, event_id, processed_at, metadata)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (gateway, event_id) DO NOTHING
            "#,
        )
        .bind(gateway)
        .bind(event_id)
        .bind(Utc::now())
        .bind(Json(metadata))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to record processed event", e))?;

        if result.rows_affected() == 1 {
            Ok(SaveResult::Inserted)
        } else {
            Ok(SaveResult::AlreadyExists)
        }
    }

    async fn release(&self, gateway: &str, event_id: &str) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM processed_webhook_events WHERE gateway = $1 AND event_id = $2")
            .bind(gateway)
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to release processed event", e))?;
        Ok(())
    }

    async fn cleanup(&self, days_old: u32) -> Result<u64, DomainError> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));
        let result = sqlx::query("DELETE FROM processed_webhook_events WHERE processed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to clean up processed events", e))?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(removed, days_old, "Purged processed webhook events");
        }
        Ok(removed)
    }
}
