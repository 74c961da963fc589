//! Status - per-state job counts.

use serde::{Deserialize, Serialize};

use crate::domain::JobState;

/// Count per state plus a total. Every state is present even at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
    pub total: u64,
}

impl JobStats {
    /// Add `count` jobs in `state`.
    pub fn record(&mut self, state: JobState, count: u64) {
        match state {
            JobState::Pending => self.pending += count,
            JobState::Processing => self.processing += count,
            JobState::Completed => self.completed += count,
            JobState::Failed => self.failed += count,
            JobState::Dead => self.dead += count,
        }
        self.total += count;
    }

    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Dead => self.dead,
        }
    }
}
