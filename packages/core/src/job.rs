//! Job domain types for units of work in the queue.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Default retry ceiling for jobs enqueued without an explicit one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Unique identifier for a job.
///
/// Callers may supply their own identifier; generated ones are ULID based so
/// they sort chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap a caller-supplied identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier of the form `job-<ulid>`.
    pub fn generate() -> Self {
        Self(format!("job-{}", Ulid::new().to_string().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed, possibly until `next_retry_at`.
    #[default]
    Pending,
    /// Claimed by a worker that holds the lease.
    Processing,
    /// Executed successfully.
    Completed,
    /// Recognized when reading rows; never written by the engine.
    Failed,
    /// Quarantined after exhausting its retries.
    Dead,
}

impl JobState {
    /// Every state, in lifecycle order.
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    /// Check if the job is in a terminal state.
    ///
    /// `Dead` counts as terminal: only an administrative retry leaves it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }

    /// Get the persisted name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a state name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job state: {0}")]
pub struct ParseStateError(pub String);

impl FromStr for JobState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "dead" => Ok(JobState::Dead),
            other => Err(ParseStateError(other.to_string())),
        }
    }
}

/// A job is a shell command queued for execution by exactly one worker at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Identity key.
    pub id: JobId,
    /// Opaque command handed to the executor.
    pub command: String,
    /// Current lifecycle state.
    pub state: JobState,
    /// Number of executions started so far.
    #[serde(default)]
    pub attempts: u32,
    /// Failed executions allowed before the job is quarantined.
    pub max_retries: u32,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the job was last mutated.
    pub updated_at: DateTime<Utc>,
    /// Earliest time a Pending job may be claimed again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Most recent failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Worker holding the lease while Processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    /// Start of the current lease.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job stamped with the current time.
    pub fn new(id: JobId, command: impl Into<String>) -> Self {
        Self::new_at(id, command, Utc::now())
    }

    /// Create a new pending job stamped with `now`.
    pub fn new_at(id: JobId, command: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: now,
            updated_at: now,
            next_retry_at: None,
            error_message: None,
            locked_by: None,
            locked_at: None,
        }
    }

    /// Set the max retries for this job.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Whether a Processing job's lease is older than `lease_duration` at `now`.
    pub fn lease_expired(&self, now: DateTime<Utc>, lease_duration: Duration) -> bool {
        match (self.state, self.locked_at) {
            (JobState::Processing, Some(locked_at)) => now - locked_at > lease_duration,
            _ => false,
        }
    }

    /// Whether `ClaimNext` may hand this job to a worker at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>, lease_duration: Duration) -> bool {
        match self.state {
            JobState::Pending => self.next_retry_at.is_none_or(|at| at <= now),
            JobState::Processing => self.lease_expired(now, lease_duration),
            _ => false,
        }
    }

    /// Whether `worker_id` currently holds this job's lease.
    pub fn is_held_by(&self, worker_id: &str) -> bool {
        self.state == JobState::Processing && self.locked_by.as_deref() == Some(worker_id)
    }

    /// Time from which the job counts as eligible, used for oldest-first ordering.
    pub fn eligible_at(&self) -> DateTime<Utc> {
        match self.state {
            JobState::Processing => self.locked_at.unwrap_or(self.created_at),
            _ => self.next_retry_at.unwrap_or(self.created_at),
        }
    }

    /// Check the lock/state invariants of the record.
    pub fn lock_invariant_holds(&self) -> bool {
        let locked = self.locked_by.is_some() && self.locked_at.is_some();
        let unlocked = self.locked_by.is_none() && self.locked_at.is_none();
        match self.state {
            JobState::Processing => locked,
            _ => unlocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new_at(JobId::new("test-job"), "echo 'test'", at(0));
        assert_eq!(job.id.as_str(), "test-job");
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES);
        assert!(job.lock_invariant_holds());
        assert!(job.is_claimable(at(0), Duration::seconds(30)));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("job-"));
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in JobState::ALL {
            assert_eq!(state.as_str().parse::<JobState>(), Ok(state));
        }
        assert!("running".parse::<JobState>().is_err());
        assert_eq!(" DEAD ".parse::<JobState>(), Ok(JobState::Dead));
    }

    #[test]
    fn test_future_retry_is_not_claimable() {
        let mut job = Job::new_at(JobId::new("j"), "true", at(0));
        job.next_retry_at = Some(at(10));
        assert!(!job.is_claimable(at(9), Duration::seconds(30)));
        assert!(job.is_claimable(at(10), Duration::seconds(30)));
    }

    #[test]
    fn test_orphaned_lease_is_claimable_only_after_expiry() {
        let mut job = Job::new_at(JobId::new("j"), "true", at(0));
        job.state = JobState::Processing;
        job.locked_by = Some("worker-1".into());
        job.locked_at = Some(at(0));
        let lease = Duration::seconds(30);

        assert!(!job.is_claimable(at(30), lease));
        assert!(job.is_claimable(at(30) + Duration::milliseconds(1), lease));
        assert!(job.is_held_by("worker-1"));
        assert!(!job.is_held_by("worker-2"));
    }

    #[test]
    fn test_terminal_states_are_never_claimable() {
        for state in [JobState::Completed, JobState::Dead, JobState::Failed] {
            let mut job = Job::new_at(JobId::new("j"), "true", at(0));
            job.state = state;
            assert!(!job.is_claimable(at(1_000), Duration::seconds(1)));
        }
    }
}
