//! SQLite-backed job store.
//!
//! The `jobs` table is the source of truth. Several worker processes may open
//! the same file: `claim` is a single `UPDATE ... WHERE id = (SELECT ... LIMIT 1)
//! RETURNING` statement, and SQLite's write lock serializes it across
//! connections and processes, so no two claims can select the same row.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::app::status::JobStats;
use crate::domain::{JobId, JobRecord, JobState, Transition, timestamp};
use crate::error::QueueError;
use crate::ports::{Clock, JobStore, SystemClock};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 8;

const COLUMNS: &str = "id, command, state, attempts, max_retries, created_at, updated_at, \
                       next_retry_at, error_message, output, claimed_by";

/// SQLite job store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteJobStore {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        Self::open_with_clock(path, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, QueueError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        debug!(path = %path.display(), "opened job database");
        Self::from_pool(pool, clock).await
    }

    /// Transient in-memory database, discarded when the store is dropped.
    ///
    /// Uses a single pooled connection: every SQLite `:memory:` connection
    /// is its own database.
    pub async fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool, clock).await
    }

    /// Wrap an existing pool and make sure the schema exists.
    pub async fn from_pool(pool: SqlitePool, clock: Arc<dyn Clock>) -> Result<Self, QueueError> {
        let store = Self { pool, clock };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id            TEXT PRIMARY KEY,
                command       TEXT NOT NULL,
                state         TEXT NOT NULL,
                attempts      INTEGER NOT NULL DEFAULT 0,
                max_retries   INTEGER NOT NULL DEFAULT 3,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL,
                next_retry_at TEXT NULL,
                error_message TEXT NULL,
                output        TEXT NULL,
                claimed_by    TEXT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state_created ON jobs(state, created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn now_text(&self) -> String {
        timestamp::format(self.clock.now())
    }
}

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

fn parse_ts(column: &str, text: &str) -> Result<chrono::DateTime<chrono::Utc>, sqlx::Error> {
    timestamp::parse(text).map_err(|e| decode_err(format!("invalid {column} '{text}': {e}")))
}

fn to_u32(column: &str, value: i64) -> Result<u32, sqlx::Error> {
    u32::try_from(value).map_err(|_| decode_err(format!("{column} out of range: {value}")))
}

fn row_to_job(row: &SqliteRow) -> Result<JobRecord, QueueError> {
    let state: String = row.try_get("state")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let next_retry_at: Option<String> = row.try_get("next_retry_at")?;

    Ok(JobRecord {
        id: JobId::new(row.try_get::<String, _>("id")?),
        command: row.try_get("command")?,
        state: state.parse()?,
        attempts: to_u32("attempts", row.try_get("attempts")?)?,
        max_retries: to_u32("max_retries", row.try_get("max_retries")?)?,
        created_at: parse_ts("created_at", &created_at)?,
        updated_at: parse_ts("updated_at", &updated_at)?,
        next_retry_at: next_retry_at
            .as_deref()
            .map(|t| parse_ts("next_retry_at", t))
            .transpose()?,
        error_message: row.try_get("error_message")?,
        output: row.try_get("output")?,
        claimed_by: row.try_get("claimed_by")?,
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: JobRecord) -> Result<JobRecord, QueueError> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, command, state, attempts, max_retries,
                created_at, updated_at, next_retry_at, error_message, output, claimed_by
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(i64::from(job.attempts))
        .bind(i64::from(job.max_retries))
        .bind(timestamp::format(job.created_at))
        .bind(timestamp::format(job.updated_at))
        .bind(job.next_retry_at.map(timestamp::format))
        .bind(&job.error_message)
        .bind(&job.output)
        .bind(&job.claimed_by)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(job),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(QueueError::DuplicateJob(job.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<JobRecord>, QueueError> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET state = 'processing',
                updated_at = ?1,
                claimed_by = ?2
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'pending'
                   OR (state = 'failed' AND (next_retry_at IS NULL OR next_retry_at <= ?1))
                ORDER BY created_at ASC,
                         CASE state WHEN 'pending' THEN 0 ELSE 1 END ASC,
                         id ASC
                LIMIT 1
            )
            RETURNING {COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(self.now_text())
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn update(&self, id: &JobId, transition: &Transition) -> Result<JobRecord, QueueError> {
        // ?1 is always the id and the last placeholder is always updated_at.
        let sql = match transition {
            Transition::Complete { .. } => format!(
                "UPDATE jobs SET state = 'completed', output = ?2, next_retry_at = NULL, \
                 updated_at = ?3 WHERE id = ?1 RETURNING {COLUMNS}"
            ),
            Transition::Retry { .. } => format!(
                "UPDATE jobs SET state = 'failed', attempts = ?2, error_message = ?3, \
                 next_retry_at = ?4, updated_at = ?5 WHERE id = ?1 RETURNING {COLUMNS}"
            ),
            Transition::Bury { .. } => format!(
                "UPDATE jobs SET state = 'dead', attempts = ?2, error_message = ?3, \
                 next_retry_at = NULL, updated_at = ?4 WHERE id = ?1 RETURNING {COLUMNS}"
            ),
        };

        let query = sqlx::query(&sql).bind(id.as_str());
        let query = match transition {
            Transition::Complete { output } => query.bind(output.as_str()),
            Transition::Retry {
                attempts,
                error_message,
                next_retry_at,
            } => query
                .bind(i64::from(*attempts))
                .bind(error_message.as_str())
                .bind(next_retry_at.map(timestamp::format)),
            Transition::Bury {
                attempts,
                error_message,
            } => query
                .bind(i64::from(*attempts))
                .bind(error_message.as_str()),
        };

        let row = query
            .bind(self.now_text())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.clone()))?;
        row_to_job(&row)
    }

    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, QueueError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn list(
        &self,
        state: Option<JobState>,
        limit: u32,
    ) -> Result<Vec<JobRecord>, QueueError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE (?1 IS NULL OR state = ?1) \
             ORDER BY updated_at DESC, id ASC \
             LIMIT ?2"
        ))
        .bind(state.map(JobState::as_str))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }

    async fn stats(&self) -> Result<JobStats, QueueError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = JobStats::default();
        for (state, count) in rows {
            stats.record(state.parse()?, count.max(0) as u64);
        }
        Ok(stats)
    }

    async fn reset_from_dlq(&self, id: &JobId) -> Result<JobRecord, QueueError> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET state = 'pending', attempts = 0, next_retry_at = NULL, \
             error_message = NULL, updated_at = ?2 \
             WHERE id = ?1 AND state = 'dead' RETURNING {COLUMNS}"
        ))
        .bind(id.as_str())
        .bind(self.now_text())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return row_to_job(&row);
        }

        match self.get(id).await? {
            None => Err(QueueError::NotFound(id.clone())),
            Some(job) => Err(QueueError::NotInDlq {
                id: id.clone(),
                state: job.state,
            }),
        }
    }
}
