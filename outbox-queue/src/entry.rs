//! Queue entry definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// What an entry carries: a reference to the job record, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Id of the `EmailJob` record in the job store.
    pub email_job_id: Uuid,
}

/// One unit of deferred work.
///
/// For the initial enqueue of a job, `job_key` equals the job id. A
/// rate-limit deferral enqueues a fresh entry under a
/// `"<id>-retry-<ns>"` key instead: it references the same job record
/// but has its own attempt budget, because a deferral is not a
/// transport failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Queue-unique key.
    pub job_key: String,

    /// Job reference.
    pub payload: JobPayload,

    /// Earliest time a consumer may receive this entry.
    pub ready_at: DateTime<Utc>,

    /// Transport failures so far.
    pub attempts: u32,

    /// Total transport attempts allowed before the entry goes dead.
    pub retry_limit: u32,

    /// When the entry was first enqueued.
    pub enqueued_at: DateTime<Utc>,

    /// Most recent failure, if any.
    pub last_error: Option<String>,
}

impl QueueEntry {
    /// Create a fresh entry.
    pub fn new(
        job_key: impl Into<String>,
        payload: JobPayload,
        ready_at: DateTime<Utc>,
        retry_limit: u32,
    ) -> Self {
        Self {
            job_key: job_key.into(),
            payload,
            ready_at,
            attempts: 0,
            retry_limit,
            enqueued_at: Utc::now(),
            last_error: None,
        }
    }

    /// Whether another transport attempt remains after a failure.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.retry_limit
    }

    /// Backoff before the next attempt: `base × 2^(attempts − 1)`.
    pub fn backoff_delay(&self, base: Duration) -> Duration {
        let factor = 2u32.saturating_pow(self.attempts.saturating_sub(1));
        base.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(attempts: u32, retry_limit: u32) -> QueueEntry {
        let mut e = QueueEntry::new(
            "key",
            JobPayload {
                email_job_id: Uuid::new_v4(),
            },
            Utc::now(),
            retry_limit,
        );
        e.attempts = attempts;
        e
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(1000);
        assert_eq!(entry(1, 3).backoff_delay(base), Duration::from_millis(1000));
        assert_eq!(entry(2, 3).backoff_delay(base), Duration::from_millis(2000));
        assert_eq!(entry(3, 3).backoff_delay(base), Duration::from_millis(4000));
    }

    #[test]
    fn test_can_retry() {
        assert!(entry(0, 3).can_retry());
        assert!(entry(2, 3).can_retry());
        assert!(!entry(3, 3).can_retry());
        assert!(!entry(0, 0).can_retry());
    }

    #[test]
    fn test_entry_serde_round_trip() {
        let e = entry(2, 3);
        let json = serde_json::to_string(&e).unwrap();
        let back: QueueEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(back.job_key, e.job_key);
        assert_eq!(back.payload, e.payload);
        assert_eq!(back.attempts, 2);
    }
}
