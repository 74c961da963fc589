//! Outcome model: the result of executing one job.
//!
//! A failed command is not an error of the queue. It is a normal outcome that
//! the decider turns into a `failed` or `dead` transition.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionOutcome {
    /// Exit code 0; captured stdout.
    Success { output: String },

    /// Non-zero exit, timeout, or launch error.
    Failure { reason: String },
}

impl ExecutionOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self::Success {
            output: output.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }
}
