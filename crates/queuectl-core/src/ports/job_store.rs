//! JobStore port - ジョブの正本（source of truth）
//!
//! # 実装
//! - `queue::SqliteJobStore`: SQLite（本番用、複数プロセスで共有可）
//! - `queue::InMemoryJobStore`: 単一プロセス用（テスト用）

use async_trait::async_trait;

use crate::app::status::JobStats;
use crate::domain::{JobId, JobRecord, JobState, NewJob, Transition};
use crate::error::QueueError;

/// JobStore は状態遷移と参照を提供する
///
/// # 設計原則
/// - `claim` は単一のアトミックな read-modify-write。同じ行を二つの worker が
///   受け取ることはない
/// - `update` は遷移の妥当性を検証しない（Decider が正しい遷移だけを要求する）
/// - ワーカーは `claim`/`update` 以外で state を読んで書き戻してはいけない
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `DuplicateJob` if the id exists.
    ///
    /// `job` must already have its defaults resolved (see `NewJob::resolve`).
    async fn enqueue(&self, job: JobRecord) -> Result<JobRecord, QueueError>;

    /// Atomically take the oldest eligible job and mark it processing.
    ///
    /// Order: `created_at` ascending, then pending before failed, then id.
    /// Returns `None` when nothing is eligible.
    async fn claim(&self, worker_id: &str) -> Result<Option<JobRecord>, QueueError>;

    /// Apply a transition and refresh `updated_at`.
    async fn update(&self, id: &JobId, transition: &Transition) -> Result<JobRecord, QueueError>;

    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, QueueError>;

    /// Jobs ordered by `updated_at` descending, optionally filtered by state.
    async fn list(&self, state: Option<JobState>, limit: u32)
    -> Result<Vec<JobRecord>, QueueError>;

    async fn stats(&self) -> Result<JobStats, QueueError>;

    /// dead -> pending with attempts reset to 0.
    async fn reset_from_dlq(&self, id: &JobId) -> Result<JobRecord, QueueError>;
}

/// Resolve a submission payload and enqueue it.
pub async fn submit(
    store: &dyn JobStore,
    job: NewJob,
    default_max_retries: u32,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<JobRecord, QueueError> {
    let record = job.resolve(default_max_retries, now)?;
    store.enqueue(record).await
}
