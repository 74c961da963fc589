//! Job record and submission payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::Transition;
use super::ids::JobId;
use super::state::JobState;
use super::timestamp;
use crate::error::QueueError;

/// A persisted job.
///
/// Design:
/// - This is the single source of truth for job state.
/// - Store implementations change it only through `claim`, `apply` and `reset_from_dlq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub command: String,
    pub state: JobState,

    /// Number of failed attempts recorded so far.
    pub attempts: u32,

    /// Failures allowed before the job moves to the DLQ.
    pub max_retries: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Earliest time a `failed` job may be claimed again (`None` = immediately).
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Last failure reason.
    pub error_message: Option<String>,

    /// Captured stdout of the successful run.
    pub output: Option<String>,

    /// Worker that last claimed the job.
    pub claimed_by: Option<String>,
}

impl JobRecord {
    /// Can a worker claim this job at `now`?
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Pending => true,
            JobState::Failed => self.next_retry_at.is_none_or(|at| at <= now),
            _ => false,
        }
    }

    /// Mark as processing on behalf of `worker_id`.
    pub fn mark_processing(&mut self, worker_id: &str, now: DateTime<Utc>) {
        self.state = JobState::Processing;
        self.claimed_by = Some(worker_id.to_string());
        self.updated_at = now;
    }

    /// Apply a state machine transition.
    pub fn apply(&mut self, transition: &Transition, now: DateTime<Utc>) {
        match transition {
            Transition::Complete { output } => {
                self.state = JobState::Completed;
                self.output = Some(output.clone());
                self.next_retry_at = None;
            }
            Transition::Retry {
                attempts,
                error_message,
                next_retry_at,
            } => {
                self.state = JobState::Failed;
                self.attempts = *attempts;
                self.error_message = Some(error_message.clone());
                self.next_retry_at = *next_retry_at;
            }
            Transition::Bury {
                attempts,
                error_message,
            } => {
                self.state = JobState::Dead;
                self.attempts = *attempts;
                self.error_message = Some(error_message.clone());
                self.next_retry_at = None;
            }
        }
        self.updated_at = now;
    }

    /// Move from Dead back to Pending with a fresh retry budget.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Pending;
        self.attempts = 0;
        self.next_retry_at = None;
        self.error_message = None;
        self.updated_at = now;
    }
}

/// Job submission payload.
///
/// ```json
/// {"id": "job1", "command": "sleep 2", "max_retries": 5}
/// ```
///
/// Optional fields left out get their defaults in [`NewJob::resolve`]. Fields
/// that are given are kept as-is, which lets operators import existing records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub id: JobId,
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<JobState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl NewJob {
    pub fn new(id: impl Into<JobId>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            state: None,
            attempts: None,
            max_retries: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Fill defaults and validate, producing the record to insert.
    pub fn resolve(
        self,
        default_max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, QueueError> {
        if self.id.is_empty() {
            return Err(QueueError::InvalidJob("job id must not be empty".to_string()));
        }
        if self.command.trim().is_empty() {
            return Err(QueueError::InvalidJob(format!(
                "job '{}' has an empty command",
                self.id
            )));
        }

        let created_at = timestamp::clamp(self.created_at.unwrap_or(now));
        Ok(JobRecord {
            id: self.id,
            command: self.command,
            state: self.state.unwrap_or(JobState::Pending),
            attempts: self.attempts.unwrap_or(0),
            max_retries: self.max_retries.unwrap_or(default_max_retries),
            created_at,
            updated_at: timestamp::clamp(self.updated_at.unwrap_or(now)),
            next_retry_at: None,
            error_message: None,
            output: None,
            claimed_by: None,
        })
    }
}
