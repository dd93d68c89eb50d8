//! Redis-backed idempotency store for multi-server deployments.
//!
//! Claims are `SET key value NX EX ttl`: the first writer wins and the
//! key expires after the retention period. Each claim is also scored by
//! its processing time in a sorted set, so `cleanup` can purge records
//! older than a cutoff before their TTL runs out.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{IdempotencyStore, SaveResult};

const KEY_PREFIX: &str = "khm:webhook";
const INDEX_KEY: &str = "khm:webhook:index";
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Redis implementation of the IdempotencyStore port.
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    conn: MultiplexedConnection,
    retention_days: u32,
}

impl RedisIdempotencyStore {
    pub fn new(conn: MultiplexedConnection, retention_days: u32) -> Self {
        Self {
            conn,
            retention_days: retention_days.max(1),
        }
    }

    fn ttl_secs(&self) -> u64 {
        u64::from(self.retention_days) * 24 * 60 * 60
    }
}

fn redis_key(gateway: &str, event_id: &str) -> String {
    format!("{}:{}:{}", KEY_PREFIX, gateway, event_id)
}

/// Highest processing time, in unix seconds, that `cleanup` removes.
fn cutoff_score(now_secs: i64, days_old: u32) -> i64 {
    now_secs.saturating_sub(i64::from(days_old) * SECONDS_PER_DAY)
}

fn unavailable(context: &str, err: redis::RedisError) -> DomainError {
    DomainError::new(ErrorCode::CacheError, format!("{}: {}", context, err))
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn has_processed(&self, gateway: &str, event_id: &str) -> Result<bool, DomainError> {
        let mut conn = self.conn.clone();
        conn.exists(redis_key(gateway, event_id))
            .await
            .map_err(|e| unavailable("Failed to check processed event", e))
    }

    async fn mark_processed(
        &self,
        gateway: &str,
        event_id: &str,
        metadata: &Value,
    ) -> Result<SaveResult, DomainError> {
        let processed_at = Timestamp::now().as_unix_secs();
        let record = serde_json::json!({
            "processed_at": processed_at,
            "metadata": metadata,
        });
        let key = redis_key(gateway, event_id);
        let mut conn = self.conn.clone();

        // SET NX replies nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(record.to_string())
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("Failed to record processed event", e))?;

        if reply.is_none() {
            return Ok(SaveResult::AlreadyExists);
        }
        conn.zadd::<_, _, _, ()>(INDEX_KEY, &key, processed_at)
            .await
            .map_err(|e| unavailable("Failed to index processed event", e))?;
        Ok(SaveResult::Inserted)
    }

    async fn release(&self, gateway: &str, event_id: &str) -> Result<(), DomainError> {
        let key = redis_key(gateway, event_id);
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .zrem(INDEX_KEY, &key)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| unavailable("Failed to release processed event", e))
    }

    async fn cleanup(&self, days_old: u32) -> Result<u64, DomainError> {
        let cutoff = cutoff_score(Timestamp::now().as_unix_secs(), days_old);
        let mut conn = self.conn.clone();

        let keys: Vec<String> = conn
            .zrangebyscore(INDEX_KEY, "-inf", cutoff)
            .await
            .map_err(|e| unavailable("Failed to list processed events", e))?;
        if keys.is_empty() {
            return Ok(0);
        }

        let (removed,): (u64,) = redis::pipe()
            .atomic()
            .del(&keys)
            .ignore()
            .zrembyscore(INDEX_KEY, "-inf", cutoff)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("Failed to purge processed events", e))?;
        tracing::info!(removed, days_old, "Purged processed webhook events");
        Ok(removed)
    }
}

impl std::fmt::Debug for RedisIdempotencyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisIdempotencyStore")
            .field("retention_days", &self.retention_days)
            .finish_non_exhaustive()
    }
}
