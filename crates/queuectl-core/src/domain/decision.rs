//! Decision model: the next persisted state after an execution.
//!
//! This module defines the closed set of writes a worker may request
//! ([`Transition`]) and the [`Decider`] trait that picks one from a claimed job
//! and its outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExecutionOutcome, JobRecord};
use crate::queue::RetryPolicy;

/// A typed write requested from the job store after an execution.
///
/// The DLQ reset is not a transition; it is an operator action with its own
/// store operation (`JobStore::reset_from_dlq`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// processing -> completed, storing stdout.
    Complete { output: String },

    /// processing -> failed, eligible again at `next_retry_at`.
    Retry {
        attempts: u32,
        error_message: String,
        next_retry_at: Option<DateTime<Utc>>,
    },

    /// processing -> dead (DLQ).
    Bury { attempts: u32, error_message: String },
}

impl Transition {
    pub fn kind(&self) -> &'static str {
        match self {
            Transition::Complete { .. } => "complete",
            Transition::Retry { .. } => "retry",
            Transition::Bury { .. } => "bury",
        }
    }
}

/// Trait for deciding the next state of a job based on its record and outcome.
///
/// Deciders are pure functions: no I/O, no mutation. The worker loop applies
/// the returned transition through the job store.
pub trait Decider: Send + Sync {
    fn decide(&self, job: &JobRecord, outcome: &ExecutionOutcome, now: DateTime<Utc>)
    -> Transition;
}

/// Default decider: attempt-based retry with exponential backoff.
///
/// - Success: complete.
/// - Failure: `attempts + 1`; dead once that reaches `max_retries`, otherwise
///   failed with `next_retry_at = now + backoff_base ^ (attempts + 1)` seconds.
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Default for DefaultDecider {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl Decider for DefaultDecider {
    fn decide(
        &self,
        job: &JobRecord,
        outcome: &ExecutionOutcome,
        now: DateTime<Utc>,
    ) -> Transition {
        match outcome {
            ExecutionOutcome::Success { output } => Transition::Complete {
                output: output.clone(),
            },
            ExecutionOutcome::Failure { reason } => {
                let attempts = job.attempts.saturating_add(1);
                if attempts >= job.max_retries {
                    Transition::Bury {
                        attempts,
                        error_message: reason.clone(),
                    }
                } else {
                    Transition::Retry {
                        attempts,
                        error_message: reason.clone(),
                        next_retry_at: Some(self.retry_policy.next_retry_at(now, attempts)),
                    }
                }
            }
        }
    }
}
