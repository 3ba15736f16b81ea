//! Redis counter store
//!
//! Shares counters across application instances. Increments run in a
//! single MULTI/EXEC pipeline so the sender and global counters move
//! together.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::RateLimitResult;
use crate::stores::CounterStore;

/// Redis-backed counter store
pub struct RedisCounterStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisCounterStore {
    /// Create a new Redis store
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub async fn new(url: &str) -> RateLimitResult<Self> {
        debug!(url = %url, "Connecting to Redis for rate limiting");

        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            prefix: "ratelimit".to_string(),
        })
    }

    /// Create a new Redis store with a custom prefix
    pub async fn with_prefix(url: &str, prefix: impl Into<String>) -> RateLimitResult<Self> {
        let mut store = Self::new(url).await?;
        store.prefix = prefix.into();
        Ok(store)
    }

    /// Get the full key with prefix
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn read_pair(&self, sender_key: &str, global_key: &str) -> RateLimitResult<(u64, u64)> {
        let mut conn = self.conn.clone();

        let (sender, global): (Option<u64>, Option<u64>) = redis::pipe()
            .get(self.key(sender_key))
            .get(self.key(global_key))
            .query_async(&mut conn)
            .await?;

        let pair = (sender.unwrap_or(0), global.unwrap_or(0));
        trace!(sender = pair.0, global = pair.1, "Counter read");
        Ok(pair)
    }

    async fn increment_pair(
        &self,
        sender_key: &str,
        global_key: &str,
        ttl: Duration,
    ) -> RateLimitResult<()> {
        let mut conn = self.conn.clone();
        let sender_key = self.key(sender_key);
        let global_key = self.key(global_key);
        let ttl_secs = ttl.as_secs() as i64;

        let _: () = redis::pipe()
            .atomic()
            .incr(&sender_key, 1)
            .ignore()
            .expire(&sender_key, ttl_secs)
            .ignore()
            .incr(&global_key, 1)
            .ignore()
            .expire(&global_key, ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}
