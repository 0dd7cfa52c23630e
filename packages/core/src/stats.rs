//! Aggregate job counts per state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::job::JobState;

/// Number of jobs in each state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
}

impl QueueStats {
    /// Build stats from per-state counts; unlisted states count as zero.
    pub fn from_counts(counts: &HashMap<JobState, u64>) -> Self {
        let get = |state| counts.get(&state).copied().unwrap_or(0);
        Self {
            pending: get(JobState::Pending),
            processing: get(JobState::Processing),
            completed: get(JobState::Completed),
            failed: get(JobState::Failed),
            dead: get(JobState::Dead),
        }
    }

    pub fn count(&self, state: JobState) -> u64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Dead => self.dead,
        }
    }

    /// Jobs still owed an execution (pending + processing).
    pub fn active(&self) -> u64 {
        self.pending + self.processing
    }

    pub fn total(&self) -> u64 {
        JobState::ALL.iter().map(|s| self.count(*s)).sum()
    }
}
