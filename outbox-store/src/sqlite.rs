//! SQLite-backed job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::job::{EmailJob, EmailStatus, NewEmailJob, StatusOrder, StatusTimestamps, User};
use crate::store::JobStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY,
    email       TEXT NOT NULL UNIQUE,
    name        TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS email_jobs (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL REFERENCES users(id),
    recipient     TEXT NOT NULL,
    subject       TEXT NOT NULL,
    body          TEXT NOT NULL,
    status        TEXT NOT NULL,
    scheduled_at  TEXT NOT NULL,
    sent_at       TEXT,
    failed_at     TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_email_jobs_status ON email_jobs(status);
CREATE INDEX IF NOT EXISTS idx_email_jobs_scheduled_at ON email_jobs(scheduled_at);
"#;

/// Job store over a SQLite database.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Connect to a SQLite database, creating the file if missing.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        debug!(url = %url, "Connecting job store");

        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// In-memory store for tests and embedded use.
    ///
    /// Pinned to a single connection: every pooled connection to
    /// `sqlite::memory:` would otherwise see its own empty database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create the schema if it does not exist. Idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!("Job store schema ready");
        Ok(())
    }

    /// The underlying pool, for callers that share the database.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    user_id: String,
    recipient: String,
    subject: String,
    body: String,
    status: String,
    scheduled_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for EmailJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(EmailJob {
            id: parse_id(&row.id)?,
            user_id: parse_id(&row.user_id)?,
            recipient: row.recipient,
            subject: row.subject,
            body: row.body,
            status: row.status.parse()?,
            scheduled_at: row.scheduled_at,
            sent_at: row.sent_at,
            failed_at: row.failed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: parse_id(&row.id)?,
            email: row.email,
            name: row.name,
            created_at: row.created_at,
        })
    }
}

fn parse_id(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| StoreError::InvalidId(raw.to_string()))
}

const SELECT_JOB: &str = "SELECT id, user_id, recipient, subject, body, status, scheduled_at, \
     sent_at, failed_at, created_at, updated_at FROM email_jobs";

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, job: NewEmailJob) -> StoreResult<EmailJob> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO email_jobs \
             (id, user_id, recipient, subject, body, status, scheduled_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(job.user_id.to_string())
        .bind(&job.recipient)
        .bind(&job.subject)
        .bind(&job.body)
        .bind(EmailStatus::Scheduled.as_str())
        .bind(job.scheduled_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %id, recipient = %job.recipient, "Job created");

        Ok(EmailJob {
            id,
            user_id: job.user_id,
            recipient: job.recipient,
            subject: job.subject,
            body: job.body,
            status: EmailStatus::Scheduled,
            scheduled_at: job.scheduled_at,
            sent_at: None,
            failed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<EmailJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!("{SELECT_JOB} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(EmailJob::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: EmailStatus,
        stamps: StatusTimestamps,
    ) -> StoreResult<()> {
        // sent_at/failed_at are written verbatim so that the
        // "non-null iff terminal" invariant holds across re-attempts of
        // previously failed jobs.
        let result = sqlx::query(
            "UPDATE email_jobs SET status = ?, sent_at = ?, failed_at = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(stamps.sent_at)
        .bind(stamps.failed_at)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(id));
        }

        debug!(job_id = %id, status = %status, "Job status updated");
        Ok(())
    }

    async fn list_by_status(
        &self,
        statuses: &[EmailStatus],
        order: StatusOrder,
    ) -> StoreResult<Vec<EmailJob>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "{SELECT_JOB} WHERE status IN ({placeholders}) ORDER BY {}",
            order.sql()
        );

        let mut query = sqlx::query_as::<_, JobRow>(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(EmailJob::try_from).collect()
    }

    async fn list_all(&self) -> StoreResult<Vec<EmailJob>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!("{SELECT_JOB} ORDER BY created_at DESC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(EmailJob::try_from).collect()
    }

    async fn list_pending(&self) -> StoreResult<Vec<EmailJob>> {
        self.list_by_status(
            &[EmailStatus::Scheduled, EmailStatus::Processing],
            StatusOrder::ScheduledAsc,
        )
        .await
    }

    async fn upsert_user(&self, email: &str, name: Option<&str>) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, email, name, created_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(email) DO UPDATE SET name = COALESCE(excluded.name, users.name) \
             RETURNING id, email, name, created_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(email)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn store_with_user() -> (SqliteJobStore, User) {
        let store = SqliteJobStore::in_memory().await.unwrap();
        let user = store.upsert_user("sender@example.com", None).await.unwrap();
        (store, user)
    }

    fn new_job(user_id: Uuid, scheduled_at: DateTime<Utc>) -> NewEmailJob {
        NewEmailJob {
            user_id,
            recipient: "someone@example.com".to_string(),
            subject: "Subject".to_string(),
            body: "<p>Body</p>".to_string(),
            scheduled_at,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, user) = store_with_user().await;
        let scheduled = Utc::now() + Duration::minutes(5);

        let created = store.create(new_job(user.id, scheduled)).await.unwrap();
        assert_eq!(created.status, EmailStatus::Scheduled);
        assert!(created.sent_at.is_none());

        let fetched = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.recipient, "someone@example.com");
        assert_eq!(fetched.status, EmailStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_sets_timestamps() {
        let (store, user) = store_with_user().await;
        let job = store.create(new_job(user.id, Utc::now())).await.unwrap();

        let sent_at = Utc::now();
        store
            .update_status(job.id, EmailStatus::Sent, StatusTimestamps::sent(sent_at))
            .await
            .unwrap();

        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, EmailStatus::Sent);
        assert!(fetched.sent_at.is_some());
        assert!(fetched.failed_at.is_none());
    }

    #[tokio::test]
    async fn test_failed_then_sent_clears_failed_at() {
        let (store, user) = store_with_user().await;
        let job = store.create(new_job(user.id, Utc::now())).await.unwrap();

        store
            .update_status(
                job.id,
                EmailStatus::Failed,
                StatusTimestamps::failed(Utc::now()),
            )
            .await
            .unwrap();

        // A later re-attempt succeeds; failed_at must not linger.
        store
            .update_status(job.id, EmailStatus::Sent, StatusTimestamps::sent(Utc::now()))
            .await
            .unwrap();

        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, EmailStatus::Sent);
        assert!(fetched.sent_at.is_some());
        assert!(fetched.failed_at.is_none());
    }

    #[tokio::test]
    async fn test_update_status_unknown_job() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        let err = store
            .update_status(Uuid::new_v4(), EmailStatus::Sent, StatusTimestamps::none())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_scheduled_at_survives_status_updates() {
        let (store, user) = store_with_user().await;
        let scheduled = Utc::now() + Duration::hours(1);
        let job = store.create(new_job(user.id, scheduled)).await.unwrap();

        store
            .update_status(job.id, EmailStatus::Processing, StatusTimestamps::none())
            .await
            .unwrap();

        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(
            fetched.scheduled_at.timestamp_millis(),
            scheduled.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_list_pending() {
        let (store, user) = store_with_user().await;
        let a = store.create(new_job(user.id, Utc::now())).await.unwrap();
        let b = store.create(new_job(user.id, Utc::now())).await.unwrap();
        let c = store.create(new_job(user.id, Utc::now())).await.unwrap();

        store
            .update_status(b.id, EmailStatus::Processing, StatusTimestamps::none())
            .await
            .unwrap();
        store
            .update_status(c.id, EmailStatus::Sent, StatusTimestamps::sent(Utc::now()))
            .await
            .unwrap();

        let pending = store.list_pending().await.unwrap();
        let ids: Vec<Uuid> = pending.iter().map(|j| j.id).collect();
        assert!(ids.contains(&a.id));
        assert!(ids.contains(&b.id));
        assert!(!ids.contains(&c.id));
    }

    #[tokio::test]
    async fn test_list_by_status_order() {
        let (store, user) = store_with_user().await;
        let later = store
            .create(new_job(user.id, Utc::now() + Duration::minutes(10)))
            .await
            .unwrap();
        let sooner = store
            .create(new_job(user.id, Utc::now() + Duration::minutes(1)))
            .await
            .unwrap();

        let listed = store
            .list_by_status(&[EmailStatus::Scheduled], StatusOrder::ScheduledAsc)
            .await
            .unwrap();

        assert_eq!(listed[0].id, sooner.id);
        assert_eq!(listed[1].id, later.id);
    }

    #[tokio::test]
    async fn test_list_by_status_empty_filter() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        assert!(
            store
                .list_by_status(&[], StatusOrder::CreatedDesc)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_upsert_user_is_stable_by_email() {
        let store = SqliteJobStore::in_memory().await.unwrap();

        let first = store.upsert_user("a@example.com", None).await.unwrap();
        let second = store
            .upsert_user("a@example.com", Some("Alice"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Alice"));

        // A name-less upsert keeps the existing name.
        let third = store.upsert_user("a@example.com", None).await.unwrap();
        assert_eq!(third.name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
    }
}
