//! WorkerPool - N 本の WorkerLoop を起動・停止する
//!
//! - 全ワーカーは1つの shutdown `watch` チャネルを共有する
//! - `shutdown(grace)` は新規 claim を止め、実行中ジョブの完了を grace まで待つ
//! - grace を過ぎたワーカーは abort（子プロセスは `kill_on_drop` で kill される）
//! - クラッシュしたワーカーは再起動しない

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::worker_loop::{WorkerDeps, WorkerLoop, WorkerPhase};

/// Result of a graceful shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Loops that finished on their own within the grace period.
    pub stopped: usize,
    /// Loops aborted after the grace period.
    pub aborted: usize,
}

struct PoolMember {
    worker_id: String,
    phase: watch::Receiver<WorkerPhase>,
    join: JoinHandle<()>,
}

/// Worker pool handle.
/// - `request_shutdown()` で全ワーカーに停止を通知する
/// - handle を drop すると shutdown sender も drop され、ワーカーは次の境界で止まる
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    members: Vec<PoolMember>,
}

impl WorkerPool {
    /// Spawn `count` loops named `worker-1` ... `worker-N`.
    pub fn spawn(count: usize, deps: WorkerDeps) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let members = (1..=count)
            .map(|n| {
                let worker = WorkerLoop::new(format!("worker-{n}"), deps.clone());
                let worker_id = worker.worker_id().to_string();
                let phase = worker.subscribe();
                let rx = shutdown_rx.clone();
                let join = tokio::spawn(async move { worker.run(rx).await });
                PoolMember {
                    worker_id,
                    phase,
                    join,
                }
            })
            .collect();

        info!(count, "worker pool started");
        Self {
            shutdown_tx,
            members,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn worker_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.worker_id.as_str()).collect()
    }

    /// Ask every loop to stop after its current job.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Resolve once every loop has reached `Stopped` (or its task is gone).
    /// Does not consume the pool, so it can race a signal before `shutdown`.
    pub async fn stopped(&mut self) {
        for member in &mut self.members {
            let _ = member.phase.wait_for(|p| *p == WorkerPhase::Stopped).await;
        }
    }

    /// Wait for every loop to exit by itself (drain mode).
    pub async fn wait(self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        for member in self.members {
            if let Err(e) = member.join.await {
                error!(worker.id = %member.worker_id, error = %e, "worker task failed");
            }
            report.stopped += 1;
        }
        report
    }

    /// Request shutdown, then wait up to `grace` in total for the loops to
    /// finish their in-flight jobs. Loops still running afterwards are aborted.
    pub async fn shutdown(self, grace: Duration) -> ShutdownReport {
        self.request_shutdown();
        info!(grace_secs = grace.as_secs(), "shutting down worker pool");

        let deadline = tokio::time::Instant::now() + grace;
        let mut report = ShutdownReport::default();
        for mut member in self.members {
            match tokio::time::timeout_at(deadline, &mut member.join).await {
                Ok(Ok(())) => report.stopped += 1,
                Ok(Err(e)) => {
                    error!(worker.id = %member.worker_id, error = %e, "worker task failed");
                    report.stopped += 1;
                }
                Err(_) => {
                    warn!(worker.id = %member.worker_id, "grace period elapsed, aborting worker");
                    member.join.abort();
                    // abort 後の JoinError(cancelled) は想定内
                    let _ = member.join.await;
                    report.aborted += 1;
                }
            }
        }

        info!(
            stopped = report.stopped,
            aborted = report.aborted,
            "worker pool stopped"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::worker_loop::WorkerOptions;
    use std::sync::Arc;
    use crate::domain::{DefaultDecider, ExecutionOutcome, JobState, NewJob};
    use crate::ports::{CommandExecutor, JobStore, SystemClock};
    use crate::queue::InMemoryJobStore;
    use async_trait::async_trait;
    use chrono::Utc;

    struct SleepExecutor(Duration);

    #[async_trait]
    impl CommandExecutor for SleepExecutor {
        async fn execute(&self, command: &str) -> ExecutionOutcome {
            tokio::time::sleep(self.0).await;
            ExecutionOutcome::success(command)
        }
    }

    fn deps(store: Arc<InMemoryJobStore>, job_time: Duration, drain: bool) -> WorkerDeps {
        WorkerDeps {
            store,
            executor: Arc::new(SleepExecutor(job_time)),
            decider: Arc::new(DefaultDecider::default()),
            clock: Arc::new(SystemClock),
            options: WorkerOptions {
                poll_interval: Duration::from_millis(10),
                jitter: Duration::ZERO,
                drain,
            },
        }
    }

    async fn seed(store: &InMemoryJobStore, count: usize) {
        for i in 0..count {
            let job = NewJob::new(format!("job-{i:02}"), format!("echo {i}"))
                .resolve(3, Utc::now())
                .unwrap();
            store.enqueue(job).await.unwrap();
        }
    }

    #[test]
    fn report_defaults_to_zero() {
        assert_eq!(ShutdownReport::default(), ShutdownReport { stopped: 0, aborted: 0 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn workers_drain_the_queue() {
        let store = Arc::new(InMemoryJobStore::default());
        seed(&store, 12).await;

        let pool = WorkerPool::spawn(3, deps(store.clone(), Duration::from_millis(5), true));
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.worker_ids(), vec!["worker-1", "worker-2", "worker-3"]);

        let report = tokio::time::timeout(Duration::from_secs(10), pool.wait())
            .await
            .unwrap();
        assert_eq!(report.stopped, 3);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.completed, 12);
        assert_eq!(stats.processing, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stopped_resolves_after_drain() {
        let store = Arc::new(InMemoryJobStore::default());
        seed(&store, 4).await;

        let mut pool = WorkerPool::spawn(2, deps(store.clone(), Duration::from_millis(5), true));
        tokio::time::timeout(Duration::from_secs(10), pool.stopped())
            .await
            .unwrap();

        let report = pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report, ShutdownReport { stopped: 2, aborted: 0 });
        assert_eq!(store.stats().await.unwrap().completed, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shutdown_within_grace_stops_every_worker() {
        let store = Arc::new(InMemoryJobStore::default());
        let pool = WorkerPool::spawn(4, deps(store, Duration::from_millis(5), false));

        let report = pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(report, ShutdownReport { stopped: 4, aborted: 0 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn in_flight_job_finishes_before_shutdown() {
        let store = Arc::new(InMemoryJobStore::default());
        seed(&store, 1).await;

        let pool = WorkerPool::spawn(1, deps(store.clone(), Duration::from_millis(300), false));
        while store.stats().await.unwrap().processing == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let report = pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(report.stopped, 1);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.get(JobState::Completed), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn workers_past_grace_are_aborted() {
        let store = Arc::new(InMemoryJobStore::default());
        seed(&store, 1).await;

        let pool = WorkerPool::spawn(1, deps(store.clone(), Duration::from_secs(60), false));
        while store.stats().await.unwrap().processing == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let report = pool.shutdown(Duration::from_millis(100)).await;
        assert_eq!(report, ShutdownReport { stopped: 0, aborted: 1 });
        // the aborted job stays claimed
        assert_eq!(store.stats().await.unwrap().processing, 1);
    }
}
