//! Recording mock transport for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::email::{OutboundEmail, SendOutcome};
use crate::error::{MailError, MailResult};
use crate::transport::Transport;

/// One delivered message, with its delivery time.
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub email: OutboundEmail,
    pub at: DateTime<Utc>,
}

/// Transport that records every send instead of delivering.
///
/// Failures can be scripted: the first `fail_times(n)` send calls
/// return a transport error, everything after succeeds. Message ids
/// are deterministic (`mock-1`, `mock-2`, ...).
#[derive(Clone, Default)]
pub struct MockTransport {
    records: Arc<Mutex<Vec<SentRecord>>>,
    fail_remaining: Arc<Mutex<u32>>,
    calls: Arc<Mutex<u32>>,
}

impl MockTransport {
    /// Create a mock that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` send calls.
    pub fn fail_times(self, n: u32) -> Self {
        *self.fail_remaining.lock().unwrap() = n;
        self
    }

    /// Every successful delivery, in order.
    pub fn records(&self) -> Vec<SentRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Delivered messages, in order.
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.records().into_iter().map(|r| r.email).collect()
    }

    /// Number of successful deliveries.
    pub fn sent_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Total send calls, failed ones included.
    pub fn attempts(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, email: &OutboundEmail) -> MailResult<SendOutcome> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };

        {
            let mut remaining = self.fail_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                debug!(to = %email.to, attempt, "Mock transport scripted failure");
                return Err(MailError::Transport("scripted failure".to_string()));
            }
        }

        let outcome = SendOutcome {
            message_id: format!("mock-{attempt}"),
            preview_url: Some(format!("mock://preview/{attempt}")),
        };

        self.records.lock().unwrap().push(SentRecord {
            email: email.clone(),
            at: Utc::now(),
        });

        debug!(to = %email.to, message_id = %outcome.message_id, "Mock transport delivered");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_sends_in_order() {
        let mock = MockTransport::new();

        mock.send(&OutboundEmail::new("a@x.com", "1", "b")).await.unwrap();
        mock.send(&OutboundEmail::new("b@x.com", "2", "b")).await.unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(sent[1].to, "b@x.com");
    }

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let mock = MockTransport::new().fail_times(2);
        let email = OutboundEmail::new("a@x.com", "s", "b");

        assert!(mock.send(&email).await.is_err());
        assert!(mock.send(&email).await.is_err());

        let outcome = mock.send(&email).await.unwrap();
        assert_eq!(outcome.message_id, "mock-3");

        assert_eq!(mock.attempts(), 3);
        assert_eq!(mock.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let mock = MockTransport::new();
        let handle = mock.clone();

        mock.send(&OutboundEmail::new("a@x.com", "s", "b")).await.unwrap();
        assert_eq!(handle.sent_count(), 1);
    }
}
