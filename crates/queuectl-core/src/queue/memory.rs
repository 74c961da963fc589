//! In-memory job store.
//!
//! 同一プロセス内の worker だけが共有する前提。`claim` のアトミック性は
//! 単一の `tokio::sync::Mutex` で保証する（ロックを跨いだ await はしない）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::app::status::JobStats;
use crate::domain::{JobId, JobRecord, JobState, Transition};
use crate::error::QueueError;
use crate::ports::{Clock, JobStore, SystemClock};

/// In-memory queue state.
#[derive(Default)]
struct InMemoryState {
    /// All job records (single source of truth).
    jobs: HashMap<JobId, JobRecord>,
}

impl InMemoryState {
    /// Oldest eligible job, using the same tie-break as the SQLite store.
    fn next_eligible(&self, now: chrono::DateTime<chrono::Utc>) -> Option<JobId> {
        self.jobs
            .values()
            .filter(|job| job.is_eligible(now))
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| state_rank(a.state).cmp(&state_rank(b.state)))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|job| job.id.clone())
    }
}

fn state_rank(state: JobState) -> u8 {
    match state {
        JobState::Pending => 0,
        _ => 1,
    }
}

/// In-memory job store.
pub struct InMemoryJobStore {
    state: Mutex<InMemoryState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryJobStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
            clock,
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: JobRecord) -> Result<JobRecord, QueueError> {
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            return Err(QueueError::DuplicateJob(job.id));
        }
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<JobRecord>, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(id) = state.next_eligible(now) else {
            return Ok(None);
        };
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.mark_processing(worker_id, now);
        Ok(Some(job.clone()))
    }

    async fn update(&self, id: &JobId, transition: &Transition) -> Result<JobRecord, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.clone()))?;
        job.apply(transition, now);
        Ok(job.clone())
    }

    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(id).cloned())
    }

    async fn list(
        &self,
        filter: Option<JobState>,
        limit: u32,
    ) -> Result<Vec<JobRecord>, QueueError> {
        let state = self.state.lock().await;
        let mut jobs: Vec<JobRecord> = state
            .jobs
            .values()
            .filter(|job| filter.is_none_or(|s| job.state == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn stats(&self) -> Result<JobStats, QueueError> {
        let state = self.state.lock().await;
        let mut stats = JobStats::default();
        for job in state.jobs.values() {
            stats.record(job.state, 1);
        }
        Ok(stats)
    }

    async fn reset_from_dlq(&self, id: &JobId) -> Result<JobRecord, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.clone()))?;
        if job.state != JobState::Dead {
            return Err(QueueError::NotInDlq {
                id: id.clone(),
                state: job.state,
            });
        }
        job.reset(now);
        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewJob;
    use crate::ports::FixedClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn store() -> (InMemoryJobStore, FixedClock) {
        let clock = FixedClock::new(start());
        (InMemoryJobStore::new(Arc::new(clock.clone())), clock)
    }

    fn job(id: &str, created_offset_secs: i64) -> JobRecord {
        NewJob::new(id, "true")
            .with_created_at(start() + Duration::seconds(created_offset_secs))
            .resolve(3, start())
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_enqueue_keeps_original() {
        let (store, _) = store();
        store.enqueue(job("a", 0)).await.unwrap();

        let mut dup = job("a", 5);
        dup.command = "rm -rf /tmp/x".to_string();
        let err = store.enqueue(dup).await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateJob(id) if id.as_str() == "a"));

        let original = store.get(&JobId::new("a")).await.unwrap().unwrap();
        assert_eq!(original.command, "true");
    }

    #[tokio::test]
    async fn claim_is_fifo_by_created_at() {
        let (store, _) = store();
        store.enqueue(job("late", 10)).await.unwrap();
        store.enqueue(job("early", 0)).await.unwrap();

        let first = store.claim("w1").await.unwrap().unwrap();
        assert_eq!(first.id.as_str(), "early");
        assert_eq!(first.state, JobState::Processing);
        assert_eq!(first.claimed_by.as_deref(), Some("w1"));

        let second = store.claim("w1").await.unwrap().unwrap();
        assert_eq!(second.id.as_str(), "late");
        assert!(store.claim("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_job_waits_for_next_retry_at() {
        let (store, clock) = store();
        store.enqueue(job("a", 0)).await.unwrap();
        let claimed = store.claim("w1").await.unwrap().unwrap();
        store
            .update(
                &claimed.id,
                &Transition::Retry {
                    attempts: 1,
                    error_message: "boom".to_string(),
                    next_retry_at: Some(start() + Duration::seconds(2)),
                },
            )
            .await
            .unwrap();

        assert!(store.claim("w1").await.unwrap().is_none());
        clock.advance(Duration::seconds(2));
        let again = store.claim("w1").await.unwrap().unwrap();
        assert_eq!(again.attempts, 1);
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_a_job() {
        let store = Arc::new(InMemoryJobStore::default());
        for i in 0..20 {
            store.enqueue(job(&format!("job-{i:02}"), i)).await.unwrap();
        }

        let mut handles = Vec::new();
        for w in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                while let Some(job) = store.claim(&format!("w{w}")).await.unwrap() {
                    mine.push(job.id);
                }
                mine
            }));
        }

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 20);
    }

    #[tokio::test]
    async fn reset_requires_dead_state() {
        let (store, _) = store();
        store.enqueue(job("a", 0)).await.unwrap();

        let err = store.reset_from_dlq(&JobId::new("a")).await.unwrap_err();
        assert!(matches!(err, QueueError::NotInDlq { state: JobState::Pending, .. }));

        let err = store.reset_from_dlq(&JobId::new("missing")).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_unknown_job_is_not_found() {
        let (store, _) = store();
        let err = store
            .update(
                &JobId::new("ghost"),
                &Transition::Complete {
                    output: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_orders_by_updated_at_desc() {
        let (store, clock) = store();
        store.enqueue(job("a", 0)).await.unwrap();
        store.enqueue(job("b", 1)).await.unwrap();

        clock.advance(Duration::seconds(1));
        let claimed = store.claim("w1").await.unwrap().unwrap();
        assert_eq!(claimed.id.as_str(), "a");

        let listed = store.list(None, 10).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let pending = store.list(Some(JobState::Pending), 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(store.list(None, 1).await.unwrap().len(), 1);
    }
}
