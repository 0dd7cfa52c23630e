//! Events published as jobs move through their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Events emitted by producers, workers and the dead letter queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Job events
    /// A new job was enqueued.
    JobEnqueued {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// A worker claimed a job and holds its lease.
    JobClaimed {
        job_id: JobId,
        worker_id: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        worker_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job failed and was put back to Pending.
    JobRetryScheduled {
        job_id: JobId,
        attempts: u32,
        error: String,
        next_retry_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    /// A job exhausted its retries and moved to the dead letter queue.
    JobQuarantined {
        job_id: JobId,
        attempts: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A report arrived after the worker's lease had been reclaimed.
    StaleReport {
        job_id: JobId,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A dead job was put back to Pending by an administrator.
    JobResurrected {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },

    // Worker events
    /// A worker started polling.
    WorkerStarted {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker observed cancellation and stopped.
    WorkerStopped {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobEnqueued { timestamp, .. }
            | JobEvent::JobClaimed { timestamp, .. }
            | JobEvent::JobCompleted { timestamp, .. }
            | JobEvent::JobRetryScheduled { timestamp, .. }
            | JobEvent::JobQuarantined { timestamp, .. }
            | JobEvent::StaleReport { timestamp, .. }
            | JobEvent::JobResurrected { timestamp, .. }
            | JobEvent::WorkerStarted { timestamp, .. }
            | JobEvent::WorkerStopped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            JobEvent::JobEnqueued { job_id, .. }
            | JobEvent::JobClaimed { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. }
            | JobEvent::JobRetryScheduled { job_id, .. }
            | JobEvent::JobQuarantined { job_id, .. }
            | JobEvent::StaleReport { job_id, .. }
            | JobEvent::JobResurrected { job_id, .. } => Some(job_id),
            JobEvent::WorkerStarted { .. } | JobEvent::WorkerStopped { .. } => None,
        }
    }

    /// Get the worker ID associated with this event, if any.
    pub fn worker_id(&self) -> Option<&str> {
        match self {
            JobEvent::JobClaimed { worker_id, .. }
            | JobEvent::JobCompleted { worker_id, .. }
            | JobEvent::StaleReport { worker_id, .. }
            | JobEvent::WorkerStarted { worker_id, .. }
            | JobEvent::WorkerStopped { worker_id, .. } => Some(worker_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued { job_id, .. } => format!("Job {} enqueued", job_id),
            JobEvent::JobClaimed {
                job_id,
                worker_id,
                attempt,
                ..
            } => format!("Job {} claimed by {} (attempt {})", job_id, worker_id, attempt),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobRetryScheduled {
                job_id,
                error,
                next_retry_at,
                ..
            } => format!(
                "Job {} failed: {} (retry at {})",
                job_id,
                error,
                next_retry_at.to_rfc3339()
            ),
            JobEvent::JobQuarantined {
                job_id, attempts, ..
            } => format!("Job {} moved to DLQ after {} attempts", job_id, attempts),
            JobEvent::StaleReport {
                job_id, worker_id, ..
            } => format!("Stale report for job {} from {}", job_id, worker_id),
            JobEvent::JobResurrected { job_id, .. } => {
                format!("Job {} requeued from DLQ", job_id)
            }
            JobEvent::WorkerStarted { worker_id, .. } => format!("Worker {} started", worker_id),
            JobEvent::WorkerStopped { worker_id, .. } => format!("Worker {} stopped", worker_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_tagged_for_subscribers() {
        let event = JobEvent::JobClaimed {
            job_id: JobId::new("j1"),
            worker_id: "worker-1".into(),
            attempt: 2,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "job_claimed");
        assert_eq!(json["job_id"], "j1");
        assert_eq!(event.worker_id(), Some("worker-1"));
        assert_eq!(event.description(), "Job j1 claimed by worker-1 (attempt 2)");
    }
}
