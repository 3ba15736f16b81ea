//! Durable email job store for OutBox.
//!
//! The store is the source of truth for every job: the delay queue only
//! carries job ids, and in any conflict between store and queue the
//! store wins. Provides:
//! - `EmailJob` records with a four-state lifecycle
//!   (scheduled → processing → sent | failed)
//! - `User` identity records, upserted by email on first use
//! - the [`JobStore`] trait consumed by the scheduler and worker pool
//! - [`SqliteJobStore`], a `sqlx`-backed implementation
//!
//! ## Quick Start
//!
//! ```no_run
//! use outbox_store::{JobStore, NewEmailJob, SqliteJobStore};
//! use chrono::Utc;
//!
//! # async fn example() -> outbox_store::StoreResult<()> {
//! let store = SqliteJobStore::connect("sqlite:outbox.db").await?;
//! store.migrate().await?;
//!
//! let user = store.upsert_user("sender@example.com", Some("Sender")).await?;
//! let job = store
//!     .create(NewEmailJob {
//!         user_id: user.id,
//!         recipient: "someone@example.com".to_string(),
//!         subject: "Hello".to_string(),
//!         body: "<p>Hi</p>".to_string(),
//!         scheduled_at: Utc::now(),
//!     })
//!     .await?;
//!
//! assert!(store.get(job.id).await?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod job;
pub mod sqlite;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use job::{EmailJob, EmailStatus, NewEmailJob, StatusOrder, StatusTimestamps, User};
pub use sqlite::SqliteJobStore;
pub use store::JobStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::job::{EmailJob, EmailStatus, NewEmailJob, StatusOrder, StatusTimestamps, User};
    pub use crate::sqlite::SqliteJobStore;
    pub use crate::store::JobStore;
}
