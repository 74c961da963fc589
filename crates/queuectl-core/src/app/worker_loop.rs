//! WorkerLoop - ジョブ実行ループ
//!
//! # フロー
//! 1. `JobStore::claim()` で1件取得（processing に遷移）
//! 2. `CommandExecutor::execute()` でコマンド実行 → Outcome
//! 3. `Decider::decide()` で Transition を決める
//! 4. `JobStore::update()` で状態を反映
//!
//! 停止シグナルはイテレーションの境界と idle sleep 中にだけ見る。
//! 実行中のジョブは中断しない。
//!
//! 4 が失敗したら Transition を保持し、次の claim の前に同じ書き込みを再試行する。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::domain::{Decider, JobId, JobRecord, Transition};
use crate::error::QueueError;
use crate::ports::{Clock, CommandExecutor, JobStore};

/// Loop tuning.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Sleep between claims when the queue is empty.
    pub poll_interval: Duration,

    /// Upper bound of the random delay added to `poll_interval`.
    pub jitter: Duration,

    /// Exit the first time the queue is found empty.
    pub drain: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            jitter: Duration::ZERO,
            drain: false,
        }
    }
}

/// Observable phase of a worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Claiming,
    Executing,
    Stopping,
    Stopped,
}

/// Everything a worker loop needs. Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<dyn JobStore>,
    pub executor: Arc<dyn CommandExecutor>,
    pub decider: Arc<dyn Decider>,
    pub clock: Arc<dyn Clock>,
    pub options: WorkerOptions,
}

/// A decided transition the store has not accepted yet.
struct UnsavedUpdate {
    id: JobId,
    transition: Transition,
}

pub struct WorkerLoop {
    worker_id: String,
    deps: WorkerDeps,
    phase: watch::Sender<WorkerPhase>,
    unsaved: Mutex<Option<UnsavedUpdate>>,
}

impl WorkerLoop {
    pub fn new(worker_id: impl Into<String>, deps: WorkerDeps) -> Self {
        let (phase, _) = watch::channel(WorkerPhase::Idle);
        Self {
            worker_id: worker_id.into(),
            deps,
            phase,
            unsaved: Mutex::new(None),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Watch the loop's phase.
    pub fn subscribe(&self) -> watch::Receiver<WorkerPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: WorkerPhase) {
        self.phase.send_replace(phase);
    }

    fn take_unsaved(&self) -> Option<UnsavedUpdate> {
        self.unsaved.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn keep_unsaved(&self, update: UnsavedUpdate) {
        *self.unsaved.lock().unwrap_or_else(|e| e.into_inner()) = Some(update);
    }

    /// Retry a transition whose earlier write failed.
    async fn flush_unsaved(&self) -> Result<(), QueueError> {
        let Some(update) = self.take_unsaved() else {
            return Ok(());
        };
        match self.deps.store.update(&update.id, &update.transition).await {
            Ok(record) => {
                info!(
                    job.id = %record.id,
                    worker.id = %self.worker_id,
                    transition = update.transition.kind(),
                    state = %record.state,
                    "saved deferred job update"
                );
                Ok(())
            }
            Err(QueueError::NotFound(id)) => {
                warn!(job.id = %id, worker.id = %self.worker_id, "job vanished before its update was saved");
                Ok(())
            }
            Err(e) => {
                self.keep_unsaved(update);
                Err(e)
            }
        }
    }

    fn sleep_duration_with_jitter(&self) -> Duration {
        let options = &self.deps.options;
        if options.jitter.is_zero() {
            return options.poll_interval;
        }

        let jitter_millis = u64::try_from(options.jitter.as_millis()).unwrap_or(u64::MAX);
        let random_jitter = rand::thread_rng().gen_range(0..=jitter_millis);
        options.poll_interval + Duration::from_millis(random_jitter)
    }

    /// Sleep one poll interval. Returns `true` if a stop was requested meanwhile.
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        self.set_phase(WorkerPhase::Idle);
        let sleep_duration = self.sleep_duration_with_jitter();
        tokio::select! {
            _ = tokio::time::sleep(sleep_duration) => false,
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped), or until
    /// the queue is empty in drain mode.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        debug!(worker.id = %self.worker_id, "worker started");
        loop {
            // sender が drop されていたら停止扱い
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }

            self.set_phase(WorkerPhase::Claiming);
            match self.run_next_job().await {
                Ok(Some(_)) => {}
                Ok(None) if self.deps.options.drain => {
                    debug!(worker.id = %self.worker_id, "queue is empty, draining worker");
                    break;
                }
                Ok(None) => {
                    trace!(worker.id = %self.worker_id, "no eligible job");
                    if self.idle(&mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(worker.id = %self.worker_id, error = %e, "job store error");
                    if self.idle(&mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.set_phase(WorkerPhase::Stopping);
        if let Err(e) = self.flush_unsaved().await
            && let Some(update) = self.take_unsaved()
        {
            error!(
                job.id = %update.id,
                worker.id = %self.worker_id,
                error = %e,
                "stopping with an unsaved job update; the job stays processing"
            );
        }
        debug!(worker.id = %self.worker_id, "worker stopped");
        self.set_phase(WorkerPhase::Stopped);
    }

    /// Claim and run one job.
    ///
    /// Returns:
    /// - `Ok(Some(job))` with the updated record if a job was run
    /// - `Ok(None)` if nothing was eligible
    /// - `Err(...)` if the store failed during claim or update
    ///
    /// A pending unsaved update is written first; no new job is claimed
    /// until it succeeds.
    pub async fn run_next_job(&self) -> Result<Option<JobRecord>, QueueError> {
        self.flush_unsaved().await?;

        let Some(job) = self.deps.store.claim(&self.worker_id).await? else {
            return Ok(None);
        };

        let span = info_span!("job", job.id = %job.id, worker.id = %self.worker_id);
        self.execute(job).instrument(span).await.map(Some)
    }

    async fn execute(&self, job: JobRecord) -> Result<JobRecord, QueueError> {
        self.set_phase(WorkerPhase::Executing);
        info!(command = %job.command, attempts = job.attempts, "claimed job");

        let outcome = self.deps.executor.execute(&job.command).await;
        let now = self.deps.clock.now();
        let transition = self.deps.decider.decide(&job, &outcome, now);

        let updated = match self.deps.store.update(&job.id, &transition).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(error = %e, transition = transition.kind(), "job update failed, will retry");
                self.keep_unsaved(UnsavedUpdate {
                    id: job.id,
                    transition,
                });
                return Err(e);
            }
        };
        debug!(transition = transition.kind(), state = %updated.state, "job updated");

        match &transition {
            Transition::Complete { .. } => info!("job completed"),
            Transition::Retry {
                attempts,
                error_message,
                next_retry_at,
            } => {
                let delay = next_retry_at
                    .map(|at| (at - now).num_seconds())
                    .unwrap_or_default();
                warn!(
                    attempts,
                    max_retries = job.max_retries,
                    delay_secs = delay,
                    error = %error_message,
                    "job failed, retry scheduled"
                );
            }
            Transition::Bury {
                attempts,
                error_message,
            } => warn!(attempts, error = %error_message, "job moved to DLQ"),
        }

        Ok(updated)
    }
}
