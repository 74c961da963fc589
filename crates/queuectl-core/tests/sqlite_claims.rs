//! File-backed SQLite store: concurrent claims, persistence, end-to-end runs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use queuectl_core::ports::FixedClock;
use queuectl_core::{
    DefaultDecider, JobId, JobState, JobStore, NewJob, RetryPolicy, ShellExecutor,
    SqliteJobStore, WorkerDeps, WorkerLoop, WorkerOptions, WorkerPool,
};

fn job(id: impl Into<String>, command: &str) -> queuectl_core::JobRecord {
    NewJob::new(id.into(), command).resolve(3, Utc::now()).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_across_connections_are_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteJobStore::open(dir.path().join("jobs.db")).await.unwrap();

    const JOBS: usize = 50;
    for i in 0..JOBS {
        store.enqueue(job(format!("job-{i:03}"), "true")).await.unwrap();
    }

    let mut handles = Vec::new();
    for w in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let worker_id = format!("worker-{w}");
            let mut mine = Vec::new();
            while let Some(job) = store.claim(&worker_id).await.unwrap() {
                assert_eq!(job.claimed_by.as_deref(), Some(worker_id.as_str()));
                mine.push(job.id);
            }
            mine
        }));
    }

    let mut claimed = Vec::new();
    for h in handles {
        claimed.extend(h.await.unwrap());
    }
    let unique: HashSet<_> = claimed.iter().cloned().collect();
    assert_eq!(claimed.len(), JOBS, "every job claimed once");
    assert_eq!(unique.len(), JOBS, "no job claimed twice");
    assert_eq!(store.stats().await.unwrap().processing, JOBS as u64);
}

#[tokio::test]
async fn two_stores_on_one_file_share_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.db");
    let a = SqliteJobStore::open(&path).await.unwrap();
    let b = SqliteJobStore::open(&path).await.unwrap();

    a.enqueue(job("only", "true")).await.unwrap();
    let first = b.claim("b").await.unwrap();
    let second = a.claim("a").await.unwrap();
    assert_eq!(first.map(|j| j.id), Some(JobId::new("only")));
    assert!(second.is_none());
}

#[tokio::test]
async fn reopening_keeps_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("jobs.db");

    {
        let store = SqliteJobStore::open(&path).await.unwrap();
        store
            .enqueue(NewJob::new("keep", "echo hi").with_max_retries(5).resolve(3, Utc::now()).unwrap())
            .await
            .unwrap();
        store.close().await;
    }

    let store = SqliteJobStore::open(&path).await.unwrap();
    let job = store.get(&JobId::new("keep")).await.unwrap().unwrap();
    assert_eq!(job.command, "echo hi");
    assert_eq!(job.max_retries, 5);
    assert_eq!(job.state, JobState::Pending);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_command_backs_off_then_lands_in_dlq() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let clock = FixedClock::new(start);
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SqliteJobStore::open_with_clock(dir.path().join("jobs.db"), Arc::new(clock.clone()))
            .await
            .unwrap(),
    );
    store
        .enqueue(NewJob::new("a", "exit 1").with_max_retries(2).resolve(3, start).unwrap())
        .await
        .unwrap();

    let worker = WorkerLoop::new(
        "worker-1",
        WorkerDeps {
            store: store.clone(),
            executor: Arc::new(ShellExecutor::new(Duration::from_secs(10))),
            decider: Arc::new(DefaultDecider::new(RetryPolicy::new(2))),
            clock: Arc::new(clock.clone()),
            options: WorkerOptions::default(),
        },
    );

    let failed = worker.run_next_job().await.unwrap().unwrap();
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.attempts, 1);
    assert_eq!(failed.next_retry_at, Some(start + chrono::Duration::seconds(2)));
    assert_eq!(failed.error_message.as_deref(), Some("exited with code 1: "));

    assert!(worker.run_next_job().await.unwrap().is_none());

    clock.advance(chrono::Duration::seconds(2));
    let dead = worker.run_next_job().await.unwrap().unwrap();
    assert_eq!(dead.state, JobState::Dead);
    assert_eq!(dead.attempts, 2);
    assert!(dead.next_retry_at.is_none());

    let dlq = store.list(Some(JobState::Dead), 10).await.unwrap();
    assert_eq!(dlq.len(), 1);

    let reset = store.reset_from_dlq(&JobId::new("a")).await.unwrap();
    assert_eq!(reset.state, JobState::Pending);
    assert_eq!(reset.attempts, 0);
    assert!(reset.error_message.is_none());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_runs_shell_jobs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteJobStore::open(dir.path().join("jobs.db")).await.unwrap());
    store.enqueue(job("b", "echo hi")).await.unwrap();
    for i in 0..5 {
        store.enqueue(job(format!("n-{i}"), &format!("echo {i}"))).await.unwrap();
    }

    let pool = WorkerPool::spawn(
        3,
        WorkerDeps {
            store: store.clone(),
            executor: Arc::new(ShellExecutor::new(Duration::from_secs(10))),
            decider: Arc::new(DefaultDecider::default()),
            clock: Arc::new(queuectl_core::SystemClock),
            options: WorkerOptions {
                poll_interval: Duration::from_millis(20),
                jitter: Duration::ZERO,
                drain: true,
            },
        },
    );
    let report = tokio::time::timeout(Duration::from_secs(30), pool.wait())
        .await
        .unwrap();
    assert_eq!(report.stopped, 3);

    let b = store.get(&JobId::new("b")).await.unwrap().unwrap();
    assert_eq!(b.state, JobState::Completed);
    assert_eq!(b.output.as_deref(), Some("hi\n"));
    assert_eq!(b.attempts, 0);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.completed, 6);
    assert_eq!(stats.total, 6);
}
