use thiserror::Error;

use crate::domain::{JobId, JobState};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job with id '{0}' already exists")]
    DuplicateJob(JobId),

    #[error("job '{0}' not found")]
    NotFound(JobId),

    #[error("job '{id}' is not in the DLQ (current state: {state})")]
    NotInDlq { id: JobId, state: JobState },

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("invalid job state: {0}")]
    InvalidState(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
