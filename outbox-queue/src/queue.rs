//! Queue trait and Redis implementation.

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::entry::{JobPayload, QueueEntry};
use crate::error::{QueueError, QueueResult};

/// What happened to a failed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Re-delayed under the same key with backoff.
    Retrying {
        /// Failure count so far.
        attempt: u32,
        /// Delay before the entry becomes ready again.
        delay: Duration,
    },
    /// Attempt budget exhausted; retained in the dead set.
    Dead,
}

/// A durable queue of deferred jobs, ordered by ready-at time.
///
/// Two distinct re-queue paths exist and must not be conflated:
/// transport failures go through [`mark_failed`](DelayQueue::mark_failed)
/// and reuse the entry's key and attempt counter; rate-limit deferrals
/// are fresh [`enqueue`](DelayQueue::enqueue) calls under a new key,
/// with the original entry completed normally.
#[async_trait]
pub trait DelayQueue: Send + Sync {
    /// Add an entry that becomes ready after `delay_ms`. Negative
    /// delays clamp to zero. Re-enqueueing a live key reschedules it;
    /// at most one entry per key is live.
    async fn enqueue(
        &self,
        job_key: &str,
        payload: JobPayload,
        delay_ms: i64,
        retry_limit: u32,
    ) -> QueueResult<QueueEntry>;

    /// Claim the next ready entry, or `None` when nothing is ready.
    /// Claiming is atomic: each entry goes to exactly one consumer.
    async fn dequeue(&self) -> QueueResult<Option<QueueEntry>>;

    /// Whether an unclaimed entry for this key is waiting for its
    /// ready time. Claimed entries do not count: a claim held by a
    /// worker that died must not stop recovery from re-queueing the
    /// job.
    async fn exists(&self, job_key: &str) -> QueueResult<bool>;

    /// Remove a finished entry.
    async fn mark_completed(&self, entry: &QueueEntry) -> QueueResult<()>;

    /// Record a transport failure: backoff-retry under the same key
    /// while the attempt budget lasts, dead set afterwards.
    async fn mark_failed(&self, entry: &QueueEntry, error: &str) -> QueueResult<FailureOutcome>;

    /// Live entry count (delayed + claimed).
    async fn size(&self) -> QueueResult<usize>;

    /// Entries that exhausted their attempt budget, with their last
    /// error. Retained for inspection.
    async fn dead_entries(&self) -> QueueResult<Vec<QueueEntry>>;
}

#[async_trait]
impl<Q: DelayQueue + ?Sized> DelayQueue for std::sync::Arc<Q> {
    async fn enqueue(
        &self,
        job_key: &str,
        payload: JobPayload,
        delay_ms: i64,
        retry_limit: u32,
    ) -> QueueResult<QueueEntry> {
        (**self).enqueue(job_key, payload, delay_ms, retry_limit).await
    }

    async fn dequeue(&self) -> QueueResult<Option<QueueEntry>> {
        (**self).dequeue().await
    }

    async fn exists(&self, job_key: &str) -> QueueResult<bool> {
        (**self).exists(job_key).await
    }

    async fn mark_completed(&self, entry: &QueueEntry) -> QueueResult<()> {
        (**self).mark_completed(entry).await
    }

    async fn mark_failed(&self, entry: &QueueEntry, error: &str) -> QueueResult<FailureOutcome> {
        (**self).mark_failed(entry, error).await
    }

    async fn size(&self) -> QueueResult<usize> {
        (**self).size().await
    }

    async fn dead_entries(&self) -> QueueResult<Vec<QueueEntry>> {
        (**self).dead_entries().await
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Queue name
    pub queue_name: String,

    /// Key prefix for Redis keys
    pub key_prefix: String,

    /// Base delay for transport-failure backoff
    pub backoff_base: Duration,
}

impl QueueConfig {
    /// Create a new queue configuration.
    pub fn new(redis_url: impl Into<String>, queue_name: impl Into<String>) -> Self {
        let queue_name = queue_name.into();
        Self {
            redis_url: redis_url.into(),
            key_prefix: format!("outbox:queue:{}", queue_name),
            queue_name,
            backoff_base: Duration::from_millis(1000),
        }
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the backoff base delay.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Build Redis key.
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.key_prefix, suffix)
    }
}

/// How many ready candidates one dequeue inspects before giving up.
/// Under contention a candidate may be claimed by another consumer
/// between the range read and the ZREM.
const CLAIM_BATCH: isize = 16;

/// Delay queue backed by Redis.
///
/// Layout, all under the configured prefix: `delayed` is a sorted set
/// of job keys scored by ready-at milliseconds; `processing` holds
/// claimed keys scored by claim time; `dead` holds exhausted keys;
/// `entry:<job_key>` is the serialized [`QueueEntry`]. Entry records
/// outlive the index sets for dead entries, so the payload and last
/// error stay inspectable.
#[derive(Clone)]
pub struct RedisDelayQueue {
    connection: ConnectionManager,
    config: QueueConfig,
}

impl RedisDelayQueue {
    /// Create a new queue.
    pub async fn new(
        redis_url: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> QueueResult<Self> {
        Self::with_config(QueueConfig::new(redis_url, queue_name)).await
    }

    /// Create a queue with custom configuration.
    pub async fn with_config(config: QueueConfig) -> QueueResult<Self> {
        info!(queue = %config.queue_name, prefix = %config.key_prefix, "Initializing delay queue");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::Config(e.to_string()))?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self { connection, config })
    }

    /// Remove every key owned by this queue. Test helper.
    pub async fn clear(&self) -> QueueResult<()> {
        let mut conn = self.connection.clone();

        let pattern = format!("{}:*", self.config.key_prefix);
        let keys: Vec<String> = conn.keys(&pattern).await?;

        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }

        Ok(())
    }

    async fn load_entry(&self, job_key: &str) -> QueueResult<Option<QueueEntry>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(self.config.key(&format!("entry:{job_key}"))).await?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| QueueError::Deserialization(e.to_string()))
        })
        .transpose()
    }

    async fn save_entry(&self, entry: &QueueEntry) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let json =
            serde_json::to_string(entry).map_err(|e| QueueError::Serialization(e.to_string()))?;

        let _: () = conn
            .set(self.config.key(&format!("entry:{}", entry.job_key)), json)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DelayQueue for RedisDelayQueue {
    async fn enqueue(
        &self,
        job_key: &str,
        payload: JobPayload,
        delay_ms: i64,
        retry_limit: u32,
    ) -> QueueResult<QueueEntry> {
        let delay_ms = delay_ms.max(0);
        let ready_at = Utc::now() + chrono::Duration::milliseconds(delay_ms);
        let entry = QueueEntry::new(job_key, payload, ready_at, retry_limit);

        self.save_entry(&entry).await?;

        let mut conn = self.connection.clone();
        let _: () = conn
            .zadd(
                self.config.key("delayed"),
                job_key,
                ready_at.timestamp_millis(),
            )
            .await?;

        debug!(job_key = %job_key, delay_ms = delay_ms, "Entry enqueued");
        Ok(entry)
    }

    async fn dequeue(&self) -> QueueResult<Option<QueueEntry>> {
        let mut conn = self.connection.clone();
        let delayed_key = self.config.key("delayed");
        let now_ms = Utc::now().timestamp_millis();

        let candidates: Vec<String> = conn
            .zrangebyscore_limit(&delayed_key, "-inf", now_ms, 0, CLAIM_BATCH)
            .await?;

        for job_key in candidates {
            // ZREM is the claim: exactly one consumer gets 1 back.
            let removed: i64 = conn.zrem(&delayed_key, &job_key).await?;
            if removed == 0 {
                continue;
            }

            let Some(entry) = self.load_entry(&job_key).await? else {
                warn!(job_key = %job_key, "Dangling index entry without record, skipping");
                continue;
            };

            let _: () = conn
                .zadd(self.config.key("processing"), &job_key, now_ms)
                .await?;

            return Ok(Some(entry));
        }

        Ok(None)
    }

    async fn exists(&self, job_key: &str) -> QueueResult<bool> {
        let mut conn = self.connection.clone();
        let score: Option<f64> = conn.zscore(self.config.key("delayed"), job_key).await?;
        Ok(score.is_some())
    }

    async fn mark_completed(&self, entry: &QueueEntry) -> QueueResult<()> {
        let mut conn = self.connection.clone();

        let _: () = redis::pipe()
            .del(self.config.key(&format!("entry:{}", entry.job_key)))
            .ignore()
            .zrem(self.config.key("processing"), &entry.job_key)
            .ignore()
            .zrem(self.config.key("delayed"), &entry.job_key)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(job_key = %entry.job_key, "Entry completed");
        Ok(())
    }

    async fn mark_failed(&self, entry: &QueueEntry, error: &str) -> QueueResult<FailureOutcome> {
        // The stored record is authoritative for the attempt counter;
        // fall back to the caller's copy if it vanished.
        let mut updated = self.load_entry(&entry.job_key).await?.unwrap_or_else(|| entry.clone());
        updated.attempts += 1;
        updated.last_error = Some(error.to_string());

        let mut conn = self.connection.clone();

        if updated.can_retry() {
            let delay = updated.backoff_delay(self.config.backoff_base);
            updated.ready_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
            self.save_entry(&updated).await?;

            let _: () = redis::pipe()
                .zrem(self.config.key("processing"), &updated.job_key)
                .ignore()
                .zadd(
                    self.config.key("delayed"),
                    &updated.job_key,
                    updated.ready_at.timestamp_millis(),
                )
                .ignore()
                .query_async(&mut conn)
                .await?;

            warn!(
                job_key = %updated.job_key,
                attempt = updated.attempts,
                delay_ms = delay.as_millis() as u64,
                "Entry failed, retrying with backoff"
            );

            Ok(FailureOutcome::Retrying {
                attempt: updated.attempts,
                delay,
            })
        } else {
            self.save_entry(&updated).await?;

            let _: () = redis::pipe()
                .zrem(self.config.key("processing"), &updated.job_key)
                .ignore()
                .zadd(
                    self.config.key("dead"),
                    &updated.job_key,
                    Utc::now().timestamp_millis(),
                )
                .ignore()
                .query_async(&mut conn)
                .await?;

            warn!(
                job_key = %updated.job_key,
                attempts = updated.attempts,
                "Entry exhausted its attempts, moved to dead set"
            );

            Ok(FailureOutcome::Dead)
        }
    }

    async fn size(&self) -> QueueResult<usize> {
        let mut conn = self.connection.clone();
        let delayed: usize = conn.zcard(self.config.key("delayed")).await?;
        let processing: usize = conn.zcard(self.config.key("processing")).await?;
        Ok(delayed + processing)
    }

    async fn dead_entries(&self) -> QueueResult<Vec<QueueEntry>> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn.zrange(self.config.key("dead"), 0, -1).await?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.load_entry(&key).await? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_config_defaults() {
        let config = QueueConfig::new("redis://localhost:6379", "emails");
        assert_eq!(config.queue_name, "emails");
        assert_eq!(config.key_prefix, "outbox:queue:emails");
        assert_eq!(config.backoff_base, Duration::from_millis(1000));
    }

    #[test]
    fn test_queue_config_builder() {
        let config = QueueConfig::new("redis://localhost:6379", "emails")
            .with_key_prefix("app:q")
            .with_backoff_base(Duration::from_millis(50));

        assert_eq!(config.key_prefix, "app:q");
        assert_eq!(config.backoff_base, Duration::from_millis(50));
    }

    #[test]
    fn test_key_generation() {
        let config = QueueConfig::new("redis://localhost:6379", "emails");
        assert_eq!(config.key("delayed"), "outbox:queue:emails:delayed");
        assert_eq!(config.key("entry:abc"), "outbox:queue:emails:entry:abc");
    }

    #[test]
    fn test_distinct_queues_do_not_share_keys() {
        let a = QueueConfig::new("redis://localhost:6379", "a");
        let b = QueueConfig::new("redis://localhost:6379", "b");
        assert_ne!(a.key("delayed"), b.key("delayed"));
    }
}
