//! In-memory delay queue.
//!
//! Same semantics as the Redis backend, without durability. Backs the
//! hermetic test suites and single-process deployments where a broker
//! is not worth operating.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::entry::{JobPayload, QueueEntry};
use crate::error::QueueResult;
use crate::queue::{DelayQueue, FailureOutcome};

#[derive(Default)]
struct MemoryState {
    /// Ready-at index: (ready_ms, seq) → job key. The seq breaks ties
    /// between entries sharing a ready time, preserving enqueue order.
    index: BTreeMap<(i64, u64), String>,
    /// Live entries, delayed or claimed.
    entries: HashMap<String, QueueEntry>,
    /// Index position of each delayed key, so re-enqueueing can drop
    /// the stale position.
    index_pos: HashMap<String, (i64, u64)>,
    /// Keys currently claimed by a consumer.
    claimed: HashSet<String>,
    /// Entries that exhausted their attempts.
    dead: HashMap<String, QueueEntry>,
    next_seq: u64,
}

/// In-process delay queue.
pub struct MemoryDelayQueue {
    state: Mutex<MemoryState>,
    backoff_base: Duration,
}

impl MemoryDelayQueue {
    /// Create an empty queue with the default 1 s backoff base.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            backoff_base: Duration::from_millis(1000),
        }
    }

    /// Set the backoff base delay.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // Held only for map operations, never across an await.
        self.state.lock().expect("memory queue lock poisoned")
    }
}

impl Default for MemoryDelayQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DelayQueue for MemoryDelayQueue {
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

        let mut state = self.lock();

        if let Some(pos) = state.index_pos.remove(job_key) {
            state.index.remove(&pos);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let pos = (ready_at.timestamp_millis(), seq);
        state.index.insert(pos, job_key.to_string());
        state.index_pos.insert(job_key.to_string(), pos);
        state.entries.insert(job_key.to_string(), entry.clone());
        state.claimed.remove(job_key);

        debug!(job_key = %job_key, delay_ms = delay_ms, "Entry enqueued");
        Ok(entry)
    }

    async fn dequeue(&self) -> QueueResult<Option<QueueEntry>> {
        let now_ms = Utc::now().timestamp_millis();
        let mut state = self.lock();

        let Some((&pos, _)) = state.index.iter().next() else {
            return Ok(None);
        };
        if pos.0 > now_ms {
            return Ok(None);
        }

        let job_key = state.index.remove(&pos).unwrap_or_default();
        state.index_pos.remove(&job_key);

        let Some(entry) = state.entries.get(&job_key).cloned() else {
            warn!(job_key = %job_key, "Dangling index entry without record, skipping");
            return Ok(None);
        };

        state.claimed.insert(job_key);
        Ok(Some(entry))
    }

    async fn exists(&self, job_key: &str) -> QueueResult<bool> {
        Ok(self.lock().index_pos.contains_key(job_key))
    }

    async fn mark_completed(&self, entry: &QueueEntry) -> QueueResult<()> {
        let mut state = self.lock();

        state.entries.remove(&entry.job_key);
        state.claimed.remove(&entry.job_key);
        if let Some(pos) = state.index_pos.remove(&entry.job_key) {
            state.index.remove(&pos);
        }

        debug!(job_key = %entry.job_key, "Entry completed");
        Ok(())
    }

    async fn mark_failed(&self, entry: &QueueEntry, error: &str) -> QueueResult<FailureOutcome> {
        let mut state = self.lock();

        let mut updated = state
            .entries
            .get(&entry.job_key)
            .cloned()
            .unwrap_or_else(|| entry.clone());
        updated.attempts += 1;
        updated.last_error = Some(error.to_string());

        state.claimed.remove(&entry.job_key);

        if updated.can_retry() {
            let delay = updated.backoff_delay(self.backoff_base);
            updated.ready_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);

            let seq = state.next_seq;
            state.next_seq += 1;
            let pos = (updated.ready_at.timestamp_millis(), seq);
            state.index.insert(pos, updated.job_key.clone());
            state.index_pos.insert(updated.job_key.clone(), pos);
            state.entries.insert(updated.job_key.clone(), updated.clone());

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
            state.entries.remove(&updated.job_key);
            if let Some(pos) = state.index_pos.remove(&updated.job_key) {
                state.index.remove(&pos);
            }
            state.dead.insert(updated.job_key.clone(), updated.clone());

            warn!(
                job_key = %updated.job_key,
                attempts = updated.attempts,
                "Entry exhausted its attempts, moved to dead set"
            );

            Ok(FailureOutcome::Dead)
        }
    }

    async fn size(&self) -> QueueResult<usize> {
        Ok(self.lock().entries.len())
    }

    async fn dead_entries(&self) -> QueueResult<Vec<QueueEntry>> {
        Ok(self.lock().dead.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn payload() -> JobPayload {
        JobPayload {
            email_job_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_immediate_entry_is_ready() {
        let queue = MemoryDelayQueue::new();
        queue.enqueue("a", payload(), 0, 3).await.unwrap();

        let entry = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(entry.job_key, "a");
    }

    #[tokio::test]
    async fn test_negative_delay_clamps_to_zero() {
        let queue = MemoryDelayQueue::new();
        let entry = queue.enqueue("a", payload(), -5_000, 3).await.unwrap();

        assert!(entry.ready_at <= Utc::now());
        assert!(queue.dequeue().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delayed_entry_is_not_ready() {
        let queue = MemoryDelayQueue::new();
        queue.enqueue("a", payload(), 60_000, 3).await.unwrap();

        assert!(queue.dequeue().await.unwrap().is_none());
        assert!(queue.exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_ready_order_follows_ready_at() {
        let queue = MemoryDelayQueue::new();
        queue.enqueue("later", payload(), 25, 3).await.unwrap();
        queue.enqueue("sooner", payload(), 0, 3).await.unwrap();

        // Once both are ready, the earlier ready-at time wins.
        tokio::time::sleep(Duration::from_millis(60)).await;
        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.job_key, "sooner");
        let second = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(second.job_key, "later");
    }

    #[tokio::test]
    async fn test_claimed_entry_is_not_handed_out_twice() {
        let queue = MemoryDelayQueue::new();
        queue.enqueue("a", payload(), 0, 3).await.unwrap();

        assert!(queue.dequeue().await.unwrap().is_some());
        assert!(queue.dequeue().await.unwrap().is_none());
        // A claimed entry no longer reads as waiting.
        assert!(!queue.exists("a").await.unwrap());
        assert_eq!(queue.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_re_enqueue_replaces_the_live_entry() {
        let queue = MemoryDelayQueue::new();
        queue.enqueue("a", payload(), 60_000, 3).await.unwrap();
        queue.enqueue("a", payload(), 0, 3).await.unwrap();

        assert_eq!(queue.size().await.unwrap(), 1);
        let entry = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(entry.job_key, "a");
        // The stale delayed position must not resurface.
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_completed_removes_entry() {
        let queue = MemoryDelayQueue::new();
        queue.enqueue("a", payload(), 0, 3).await.unwrap();
        let entry = queue.dequeue().await.unwrap().unwrap();

        queue.mark_completed(&entry).await.unwrap();
        assert!(!queue.exists("a").await.unwrap());
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_failed_retries_with_backoff() {
        let queue = MemoryDelayQueue::new().with_backoff_base(Duration::from_millis(10));
        queue.enqueue("a", payload(), 0, 3).await.unwrap();
        let entry = queue.dequeue().await.unwrap().unwrap();

        let outcome = queue.mark_failed(&entry, "boom").await.unwrap();
        assert_eq!(
            outcome,
            FailureOutcome::Retrying {
                attempt: 1,
                delay: Duration::from_millis(10)
            }
        );

        // Entry is live again, delayed by the backoff.
        assert!(queue.exists("a").await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        let retried = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(retried.attempts, 1);
        assert_eq!(retried.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_mark_failed_exhaustion_goes_dead() {
        let queue = MemoryDelayQueue::new().with_backoff_base(Duration::from_millis(1));
        queue.enqueue("a", payload(), 0, 2).await.unwrap();

        let entry = queue.dequeue().await.unwrap().unwrap();
        assert!(matches!(
            queue.mark_failed(&entry, "first").await.unwrap(),
            FailureOutcome::Retrying { attempt: 1, .. }
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let entry = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(queue.mark_failed(&entry, "second").await.unwrap(), FailureOutcome::Dead);

        assert!(!queue.exists("a").await.unwrap());
        let dead = queue.dead_entries().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
        assert_eq!(dead[0].last_error.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_size_counts_delayed_and_claimed() {
        let queue = MemoryDelayQueue::new();
        queue.enqueue("a", payload(), 0, 3).await.unwrap();
        queue.enqueue("b", payload(), 60_000, 3).await.unwrap();

        assert_eq!(queue.size().await.unwrap(), 2);
        queue.dequeue().await.unwrap().unwrap();
        assert_eq!(queue.size().await.unwrap(), 2);
    }
}
