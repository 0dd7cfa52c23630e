//! Legal job state transitions.
//!
//! Every mutation of a job record is computed here as a pure function of the
//! previous record and the current time. The store persists the result with a
//! conditional write keyed on the previous record, so a transition computed
//! from a stale read can never be applied.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{Job, JobId, JobState};
use crate::retry::{RetryDecision, RetryScheduler};

/// A transition that the state machine refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition for job {job_id}: {from} -> {to}")]
pub struct TransitionError {
    pub job_id: JobId,
    pub from: JobState,
    pub to: JobState,
}

/// How an administrative retry treats the attempt history of a dead job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResurrectPolicy {
    /// Start over: `attempts = 0`, same `max_retries`.
    #[default]
    ResetAttempts,
    /// Keep `attempts` and grant another `max_retries` worth of failures.
    PreserveAttempts,
}

/// Applies transitions to job records, consulting the retry scheduler on failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobStateMachine {
    scheduler: RetryScheduler,
}

impl JobStateMachine {
    pub fn new(scheduler: RetryScheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> RetryScheduler {
        self.scheduler
    }

    /// Whether the transition graph has an edge `from -> to`.
    pub fn is_legal(from: JobState, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (from, to),
            (Pending, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Pending)
                | (Processing, Dead)
                | (Dead, Pending)
        )
    }

    /// Hand a claimable job to `worker_id`.
    ///
    /// Also covers reclaiming a Processing job whose lease has expired.
    pub fn claim(
        &self,
        job: &Job,
        worker_id: &str,
        lease_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Job, TransitionError> {
        if !Self::is_legal(job.state, JobState::Processing)
            || !job.is_claimable(now, lease_duration)
        {
            return Err(refuse(job, JobState::Processing));
        }
        let mut next = job.clone();
        next.state = JobState::Processing;
        next.attempts = job.attempts.saturating_add(1);
        next.locked_by = Some(worker_id.to_string());
        next.locked_at = Some(now);
        touch(&mut next, now);
        Ok(next)
    }

    /// Record a successful execution.
    pub fn complete(&self, job: &Job, now: DateTime<Utc>) -> Result<Job, TransitionError> {
        if !Self::is_legal(job.state, JobState::Completed) {
            return Err(refuse(job, JobState::Completed));
        }
        let mut next = job.clone();
        next.state = JobState::Completed;
        next.next_retry_at = None;
        release(&mut next);
        touch(&mut next, now);
        Ok(next)
    }

    /// Record a failed execution, rescheduling or quarantining the job.
    pub fn fail(
        &self,
        job: &Job,
        error_message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Job, TransitionError> {
        let decision = self.scheduler.compute(job.attempts, job.max_retries, now);
        let target = match decision {
            RetryDecision::Retry { .. } => JobState::Pending,
            RetryDecision::Quarantine => JobState::Dead,
        };
        if !Self::is_legal(job.state, target) {
            return Err(refuse(job, target));
        }

        let mut next = job.clone();
        next.state = target;
        next.error_message = Some(error_message.into());
        next.next_retry_at = match decision {
            RetryDecision::Retry { next_retry_at, .. } => Some(next_retry_at),
            RetryDecision::Quarantine => None,
        };
        release(&mut next);
        touch(&mut next, now);
        Ok(next)
    }

    /// Bring a dead job back to Pending, claimable immediately.
    pub fn resurrect(
        &self,
        job: &Job,
        policy: ResurrectPolicy,
        now: DateTime<Utc>,
    ) -> Result<Job, TransitionError> {
        if job.state != JobState::Dead {
            return Err(refuse(job, JobState::Pending));
        }
        let mut next = job.clone();
        next.state = JobState::Pending;
        match policy {
            ResurrectPolicy::ResetAttempts => next.attempts = 0,
            ResurrectPolicy::PreserveAttempts => {
                next.max_retries = job.attempts.saturating_add(job.max_retries);
            }
        }
        next.error_message = None;
        next.next_retry_at = None;
        release(&mut next);
        touch(&mut next, now);
        Ok(next)
    }
}

fn refuse(job: &Job, to: JobState) -> TransitionError {
    TransitionError {
        job_id: job.id.clone(),
        from: job.state,
        to,
    }
}

fn release(job: &mut Job) {
    job.locked_by = None;
    job.locked_at = None;
}

// updated_at never moves backwards, even when the caller's clock does.
fn touch(job: &mut Job, now: DateTime<Utc>) {
    job.updated_at = now.max(job.updated_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn lease() -> Duration {
        Duration::seconds(60)
    }

    fn pending(max_retries: u32) -> Job {
        Job::new_at(JobId::new("j1"), "exit 1", at(0)).with_max_retries(max_retries)
    }

    #[test]
    fn test_claim_sets_lease_and_increments_attempts() {
        let machine = JobStateMachine::default();
        let claimed = machine.claim(&pending(3), "w1", lease(), at(1)).unwrap();
        assert_eq!(claimed.state, JobState::Processing);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.locked_by.as_deref(), Some("w1"));
        assert_eq!(claimed.locked_at, Some(at(1)));
        assert!(claimed.lock_invariant_holds());
    }

    #[test]
    fn test_claim_refuses_held_lease() {
        let machine = JobStateMachine::default();
        let claimed = machine.claim(&pending(3), "w1", lease(), at(1)).unwrap();
        let err = machine.claim(&claimed, "w2", lease(), at(2)).unwrap_err();
        assert_eq!(err.from, JobState::Processing);
        assert_eq!(err.to, JobState::Processing);

        let reclaimed = machine.claim(&claimed, "w2", lease(), at(62)).unwrap();
        assert_eq!(reclaimed.locked_by.as_deref(), Some("w2"));
        assert_eq!(reclaimed.attempts, 2);
    }

    #[test]
    fn test_complete_clears_lease() {
        let machine = JobStateMachine::default();
        let claimed = machine.claim(&pending(3), "w1", lease(), at(1)).unwrap();
        let done = machine.complete(&claimed, at(2)).unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert!(done.lock_invariant_holds());
        assert_eq!(done.updated_at, at(2));
    }

    #[test]
    fn test_complete_requires_processing() {
        let machine = JobStateMachine::default();
        let err = machine.complete(&pending(3), at(1)).unwrap_err();
        assert_eq!(err.from, JobState::Pending);
        assert_eq!(err.to, JobState::Completed);
    }

    #[test]
    fn test_failure_reschedules_with_backoff() {
        let machine = JobStateMachine::new(RetryScheduler::new(2));
        let claimed = machine.claim(&pending(3), "w1", lease(), at(0)).unwrap();
        let retried = machine.fail(&claimed, "Exit code 1", at(5)).unwrap();
        assert_eq!(retried.state, JobState::Pending);
        assert_eq!(retried.next_retry_at, Some(at(7)));
        assert_eq!(retried.error_message.as_deref(), Some("Exit code 1"));
        assert!(retried.lock_invariant_holds());
    }

    #[test]
    fn test_failure_past_max_retries_quarantines() {
        let machine = JobStateMachine::new(RetryScheduler::new(2));
        let mut job = pending(3);
        for attempt in 1..=4 {
            job = machine.claim(&job, "w1", lease(), at(attempt * 100)).unwrap();
            job = machine.fail(&job, "boom", at(attempt * 100)).unwrap();
        }
        assert_eq!(job.attempts, 4);
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.next_retry_at, None);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_resurrect_resets_attempts() {
        let machine = JobStateMachine::new(RetryScheduler::new(2));
        let mut job = pending(0);
        job = machine.claim(&job, "w1", lease(), at(1)).unwrap();
        job = machine.fail(&job, "boom", at(2)).unwrap();
        assert_eq!(job.state, JobState::Dead);

        let revived = machine
            .resurrect(&job, ResurrectPolicy::ResetAttempts, at(3))
            .unwrap();
        assert_eq!(revived.state, JobState::Pending);
        assert_eq!(revived.attempts, 0);
        assert_eq!(revived.error_message, None);
        assert!(revived.is_claimable(at(3), lease()));
    }

    #[test]
    fn test_resurrect_preserving_attempts_extends_budget() {
        let machine = JobStateMachine::new(RetryScheduler::new(2));
        let mut job = pending(1);
        for t in [1, 100] {
            job = machine.claim(&job, "w1", lease(), at(t)).unwrap();
            job = machine.fail(&job, "boom", at(t)).unwrap();
        }
        assert_eq!(job.state, JobState::Dead);

        let revived = machine
            .resurrect(&job, ResurrectPolicy::PreserveAttempts, at(200))
            .unwrap();
        assert_eq!(revived.attempts, 2);
        assert_eq!(revived.max_retries, 3);
    }

    #[test]
    fn test_resurrect_requires_dead() {
        let machine = JobStateMachine::default();
        assert!(
            machine
                .resurrect(&pending(3), ResurrectPolicy::default(), at(1))
                .is_err()
        );
    }

    #[test]
    fn test_updated_at_is_monotonic() {
        let machine = JobStateMachine::default();
        let claimed = machine.claim(&pending(3), "w1", lease(), at(10)).unwrap();
        let done = machine.complete(&claimed, at(5)).unwrap();
        assert_eq!(done.updated_at, at(10));
    }

    #[test]
    fn test_transition_graph() {
        assert!(JobStateMachine::is_legal(JobState::Pending, JobState::Processing));
        assert!(JobStateMachine::is_legal(JobState::Dead, JobState::Pending));
        assert!(!JobStateMachine::is_legal(JobState::Completed, JobState::Pending));
        assert!(!JobStateMachine::is_legal(JobState::Pending, JobState::Dead));
    }
}
