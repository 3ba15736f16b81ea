//! Email job and user records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;

/// Lifecycle state of an email job.
///
/// `Sent` and `Failed` are terminal for the record: once either is
/// written, no further transition happens to that row. A failed job is
/// re-attempted only when a queue entry for it fires again, which leads
/// back through the worker without creating a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailStatus {
    /// Waiting for its scheduled time
    Scheduled,
    /// Claimed by a worker, dispatch in progress
    Processing,
    /// Delivered to the SMTP transport
    Sent,
    /// The SMTP transport returned an error
    Failed,
}

impl EmailStatus {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Scheduled => "SCHEDULED",
            EmailStatus::Processing => "PROCESSING",
            EmailStatus::Sent => "SENT",
            EmailStatus::Failed => "FAILED",
        }
    }

    /// Whether the record accepts further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EmailStatus::Sent | EmailStatus::Failed)
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(EmailStatus::Scheduled),
            "PROCESSING" => Ok(EmailStatus::Processing),
            "SENT" => Ok(EmailStatus::Sent),
            "FAILED" => Ok(EmailStatus::Failed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// A persisted email job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailJob {
    /// Unique job identifier, assigned on create and stable for the
    /// record's lifetime. Also used as the queue entry key.
    pub id: Uuid,

    /// Sender identity; the rate-limit scope.
    pub user_id: Uuid,

    /// Recipient mailbox address.
    pub recipient: String,

    /// Subject line.
    pub subject: String,

    /// Message body (HTML allowed).
    pub body: String,

    /// Current lifecycle state.
    pub status: EmailStatus,

    /// Earliest delivery time. Never changes after creation, even when
    /// dispatch is re-delayed by rate limiting.
    pub scheduled_at: DateTime<Utc>,

    /// Set iff `status == Sent`.
    pub sent_at: Option<DateTime<Utc>>,

    /// Set iff `status == Failed`.
    pub failed_at: Option<DateTime<Utc>>,

    /// Maintained by the store.
    pub created_at: DateTime<Utc>,

    /// Maintained by the store.
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a job. The store assigns id, status and
/// timestamps.
#[derive(Debug, Clone)]
pub struct NewEmailJob {
    pub user_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub scheduled_at: DateTime<Utc>,
}

/// Timestamp fields accompanying a status update.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusTimestamps {
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl StatusTimestamps {
    /// No timestamp changes.
    pub fn none() -> Self {
        Self::default()
    }

    /// Timestamps for a transition to `Sent`.
    pub fn sent(at: DateTime<Utc>) -> Self {
        Self {
            sent_at: Some(at),
            failed_at: None,
        }
    }

    /// Timestamps for a transition to `Failed`.
    pub fn failed(at: DateTime<Utc>) -> Self {
        Self {
            sent_at: None,
            failed_at: Some(at),
        }
    }
}

/// Ordering for status-filtered listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOrder {
    /// `scheduled_at` ascending (upcoming first)
    ScheduledAsc,
    /// `sent_at` descending (most recently sent first)
    SentDesc,
    /// `created_at` descending (newest record first)
    CreatedDesc,
}

impl StatusOrder {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            StatusOrder::ScheduledAsc => "scheduled_at ASC",
            StatusOrder::SentDesc => "sent_at DESC",
            StatusOrder::CreatedDesc => "created_at DESC",
        }
    }
}

/// Minimal sender identity, upserted by email on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            EmailStatus::Scheduled,
            EmailStatus::Processing,
            EmailStatus::Sent,
            EmailStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<EmailStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_unknown_is_rejected() {
        assert!("DELIVERED".parse::<EmailStatus>().is_err());
        assert!("scheduled".parse::<EmailStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!EmailStatus::Scheduled.is_terminal());
        assert!(!EmailStatus::Processing.is_terminal());
        assert!(EmailStatus::Sent.is_terminal());
        assert!(EmailStatus::Failed.is_terminal());
    }

    #[test]
    fn test_timestamps_constructors() {
        let now = Utc::now();

        let sent = StatusTimestamps::sent(now);
        assert_eq!(sent.sent_at, Some(now));
        assert!(sent.failed_at.is_none());

        let failed = StatusTimestamps::failed(now);
        assert!(failed.sent_at.is_none());
        assert_eq!(failed.failed_at, Some(now));

        let none = StatusTimestamps::none();
        assert!(none.sent_at.is_none() && none.failed_at.is_none());
    }

    #[test]
    fn test_order_sql() {
        assert_eq!(StatusOrder::ScheduledAsc.sql(), "scheduled_at ASC");
        assert_eq!(StatusOrder::SentDesc.sql(), "sent_at DESC");
    }
}
