//! Integration tests for outbox-queue

use outbox_queue::*;
use std::time::Duration;
use uuid::Uuid;

fn payload() -> JobPayload {
    JobPayload {
        email_job_id: Uuid::new_v4(),
    }
}

#[test]
fn test_queue_config_creation() {
    let config = QueueConfig::new("redis://localhost:6379", "emails");
    assert_eq!(config.redis_url, "redis://localhost:6379");
    assert_eq!(config.queue_name, "emails");
}

#[test]
fn test_queue_config_builder() {
    let config = QueueConfig::new("redis://localhost:6379", "emails")
        .with_backoff_base(Duration::from_millis(250));

    assert_eq!(config.backoff_base, Duration::from_millis(250));
}

#[test]
fn test_entry_creation() {
    let entry = QueueEntry::new("key", payload(), chrono::Utc::now(), 3);

    assert_eq!(entry.job_key, "key");
    assert_eq!(entry.attempts, 0);
    assert_eq!(entry.retry_limit, 3);
    assert!(entry.last_error.is_none());
}

#[tokio::test]
async fn test_memory_queue_round_trip() {
    let queue = MemoryDelayQueue::new();
    let p = payload();

    queue.enqueue("job-1", p, 0, 3).await.unwrap();
    let entry = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(entry.payload, p);

    queue.mark_completed(&entry).await.unwrap();
    assert!(!queue.exists("job-1").await.unwrap());
}

// The tests below require a running Redis instance.
// Run with: cargo test -- --ignored

#[tokio::test]
#[ignore = "Requires running Redis instance"]
async fn test_redis_enqueue_dequeue_complete() {
    let queue = RedisDelayQueue::with_config(
        QueueConfig::new("redis://localhost:6379", "itest-roundtrip"),
    )
    .await
    .unwrap();
    queue.clear().await.unwrap();

    let p = payload();
    queue.enqueue("job-1", p, 0, 3).await.unwrap();
    assert!(queue.exists("job-1").await.unwrap());
    assert_eq!(queue.size().await.unwrap(), 1);

    let entry = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(entry.job_key, "job-1");
    assert_eq!(entry.payload, p);

    queue.mark_completed(&entry).await.unwrap();
    assert!(!queue.exists("job-1").await.unwrap());
    assert_eq!(queue.size().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "Requires running Redis instance"]
async fn test_redis_delayed_entry_not_visible_early() {
    let queue = RedisDelayQueue::with_config(
        QueueConfig::new("redis://localhost:6379", "itest-delayed"),
    )
    .await
    .unwrap();
    queue.clear().await.unwrap();

    queue.enqueue("job-1", payload(), 60_000, 3).await.unwrap();
    assert!(queue.dequeue().await.unwrap().is_none());
    assert!(queue.exists("job-1").await.unwrap());
}

#[tokio::test]
#[ignore = "Requires running Redis instance"]
async fn test_redis_failure_retry_then_dead() {
    let queue = RedisDelayQueue::with_config(
        QueueConfig::new("redis://localhost:6379", "itest-failures")
            .with_backoff_base(Duration::from_millis(10)),
    )
    .await
    .unwrap();
    queue.clear().await.unwrap();

    queue.enqueue("job-1", payload(), 0, 2).await.unwrap();

    let entry = queue.dequeue().await.unwrap().unwrap();
    let outcome = queue.mark_failed(&entry, "first").await.unwrap();
    assert!(matches!(outcome, FailureOutcome::Retrying { attempt: 1, .. }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let entry = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(entry.attempts, 1);

    let outcome = queue.mark_failed(&entry, "second").await.unwrap();
    assert_eq!(outcome, FailureOutcome::Dead);

    let dead = queue.dead_entries().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].last_error.as_deref(), Some("second"));
}
