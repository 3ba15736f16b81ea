//! In-memory counter store
//!
//! Uses DashMap for thread-safe concurrent access. Suitable for
//! single-instance deployments or testing. For distributed
//! deployments, use the Redis store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::error::RateLimitResult;
use crate::stores::CounterStore;

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Instant,
}

/// In-memory counter store
pub struct MemoryCounterStore {
    counters: DashMap<String, Counter>,
}

impl MemoryCounterStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Number of tracked counters (for monitoring)
    pub fn key_count(&self) -> usize {
        self.counters.len()
    }

    /// Drop expired counters
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.counters.retain(|_, c| c.expires_at > now);
    }

    fn read(&self, key: &str) -> u64 {
        match self.counters.get(key) {
            Some(counter) if counter.expires_at > Instant::now() => counter.count,
            _ => 0,
        }
    }

    fn bump(&self, key: &str, ttl: Duration) {
        let now = Instant::now();
        let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            expires_at: now + ttl,
        });

        if entry.expires_at <= now {
            entry.count = 0;
        }
        entry.count += 1;
        entry.expires_at = now + ttl;
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn read_pair(&self, sender_key: &str, global_key: &str) -> RateLimitResult<(u64, u64)> {
        let pair = (self.read(sender_key), self.read(global_key));
        trace!(sender = pair.0, global = pair.1, "Counter read");
        Ok(pair)
    }

    async fn increment_pair(
        &self,
        sender_key: &str,
        global_key: &str,
        ttl: Duration,
    ) -> RateLimitResult<()> {
        self.bump(sender_key, ttl);
        self.bump(global_key, ttl);
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(7200);

    #[tokio::test]
    async fn test_missing_counters_read_zero() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.read_pair("sender:a:1", "global:1").await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_increment_moves_both() {
        let store = MemoryCounterStore::new();

        store.increment_pair("sender:a:1", "global:1", TTL).await.unwrap();
        store.increment_pair("sender:a:1", "global:1", TTL).await.unwrap();
        store.increment_pair("sender:b:1", "global:1", TTL).await.unwrap();

        assert_eq!(store.read_pair("sender:a:1", "global:1").await.unwrap(), (2, 3));
        assert_eq!(store.read_pair("sender:b:1", "global:1").await.unwrap(), (1, 3));
    }

    #[tokio::test]
    async fn test_expired_counter_reads_zero() {
        let store = MemoryCounterStore::new();

        store
            .increment_pair("sender:a:1", "global:1", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.read_pair("sender:a:1", "global:1").await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_cleanup_drops_expired() {
        let store = MemoryCounterStore::new();

        store
            .increment_pair("sender:a:1", "global:1", Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(store.key_count(), 2);

        tokio::time::sleep(Duration::from_millis(10)).await;
        store.cleanup();
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn test_store_type() {
        assert_eq!(MemoryCounterStore::new().store_type(), "memory");
    }
}
