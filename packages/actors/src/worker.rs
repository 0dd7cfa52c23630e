//! The per-worker claim → execute → report loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use db::DbError;
use db::repositories::{JobRepository, SettingsRepository};
use queuectl_core::{Clock, ExecOutcome, Job, JobEvent, JobId, JobState, QueueConfig, SystemClock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::executor::CommandExecutor;

/// Upper bound for the back-off after repeated storage faults.
pub const MAX_FAULT_BACKOFF: Duration = Duration::from_secs(30);

/// What a single poll did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Cancellation was observed before claiming; nothing was touched.
    Cancelled,
    /// No job was eligible.
    Idle,
    /// A job was executed and its outcome stored; carries the stored row.
    Processed(Job),
    /// A job was executed but the lease had moved on; the report was discarded.
    Stale(JobId),
    /// The store failed or refused the request; the worker should back off.
    StorageFault(String),
}

/// One worker: claims a job, runs it to completion, reports, repeats.
///
/// A command is never interrupted. Cancellation is checked before each
/// claim and right after the executor returns; in the latter case the held
/// job is still reported before the loop stops.
///
/// Lease duration and poll interval are fixed when the worker is built. The
/// backoff base is re-read from the stored settings before each failure is
/// reported, so `backoff-base` changes reach running workers.
pub struct WorkerLoop {
    worker_id: String,
    jobs: JobRepository,
    settings: SettingsRepository,
    executor: Arc<dyn CommandExecutor>,
    clock: Arc<dyn Clock>,
    lease_duration: chrono::Duration,
    poll_interval: Duration,
    event_tx: Option<broadcast::Sender<JobEvent>>,
    fault_streak: u32,
}

impl WorkerLoop {
    pub fn new(
        worker_id: impl Into<String>,
        jobs: JobRepository,
        executor: Arc<dyn CommandExecutor>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            settings: SettingsRepository::new(jobs.database().clone()),
            jobs: jobs.with_retry_scheduler(config.retry_scheduler()),
            executor,
            clock: Arc::new(SystemClock),
            lease_duration: config.lease_duration(),
            poll_interval: config.poll_interval(),
            event_tx: None,
            fault_streak: 0,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Poll until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        self.started();

        loop {
            let outcome = self.poll_once(&cancel).await;
            let Some(pause) = self.pause_after(&outcome, &cancel) else {
                break;
            };
            if pause.is_zero() {
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.stopped();
    }

    /// Claim at most one job, execute it and report the outcome.
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> PollOutcome {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }

        let claimed = self
            .jobs
            .claim_next(&self.worker_id, self.lease_duration, self.clock.now())
            .await;

        let job = match claimed {
            Ok(Some(job)) => job,
            Ok(None) => {
                self.fault_streak = 0;
                tracing::debug!(worker_id = %self.worker_id, "No eligible job");
                return PollOutcome::Idle;
            }
            Err(e) => {
                self.fault_streak = self.fault_streak.saturating_add(1);
                if e.is_storage_fault() {
                    tracing::warn!(
                        worker_id = %self.worker_id,
                        error = %e,
                        streak = self.fault_streak,
                        "Claim failed, backing off"
                    );
                } else {
                    tracing::error!(
                        worker_id = %self.worker_id,
                        error = %e,
                        streak = self.fault_streak,
                        "Claim rejected, check the queue settings"
                    );
                }
                return PollOutcome::StorageFault(e.to_string());
            }
        };
        self.fault_streak = 0;

        tracing::info!(
            job_id = %job.id,
            worker_id = %self.worker_id,
            attempts = job.attempts,
            command = %job.command,
            "Processing job"
        );
        self.emit(JobEvent::JobClaimed {
            job_id: job.id.clone(),
            worker_id: self.worker_id.clone(),
            attempt: job.attempts,
            timestamp: self.clock.now(),
        });

        let started = Instant::now();
        let outcome = self.executor.execute(&job.command).await;
        let elapsed = started.elapsed();

        if cancel.is_cancelled() {
            tracing::info!(
                job_id = %job.id,
                worker_id = %self.worker_id,
                "Cancelled during execution, reporting held job before stopping"
            );
        }

        self.report(job, outcome, elapsed).await
    }

    /// How long to wait before the next poll, or `None` to stop.
    pub fn pause_after(&self, outcome: &PollOutcome, cancel: &CancellationToken) -> Option<Duration> {
        if cancel.is_cancelled() {
            return None;
        }
        match outcome {
            PollOutcome::Cancelled => None,
            PollOutcome::Idle => Some(self.poll_interval),
            PollOutcome::Processed(_) | PollOutcome::Stale(_) => Some(Duration::ZERO),
            PollOutcome::StorageFault(_) => Some(fault_backoff(self.poll_interval, self.fault_streak)),
        }
    }

    pub(crate) fn started(&self) {
        tracing::info!(worker_id = %self.worker_id, "Worker started");
        self.emit(JobEvent::WorkerStarted {
            worker_id: self.worker_id.clone(),
            timestamp: self.clock.now(),
        });
    }

    pub(crate) fn stopped(&self) {
        tracing::info!(worker_id = %self.worker_id, "Worker stopped");
        self.emit(JobEvent::WorkerStopped {
            worker_id: self.worker_id.clone(),
            timestamp: self.clock.now(),
        });
    }

    async fn report(&mut self, job: Job, outcome: ExecOutcome, elapsed: Duration) -> PollOutcome {
        if !outcome.is_success() {
            self.refresh_retry_scheduler().await;
        }

        let reported = self
            .jobs
            .report_outcome(&job.id, &self.worker_id, &outcome, self.clock.now())
            .await;

        let stored = match reported {
            Ok(stored) => stored,
            Err(DbError::StaleClaim { .. }) | Err(DbError::NotFound(_)) => {
                tracing::warn!(
                    job_id = %job.id,
                    worker_id = %self.worker_id,
                    "Lease lost before report, discarding outcome"
                );
                self.emit(JobEvent::StaleReport {
                    job_id: job.id.clone(),
                    worker_id: self.worker_id.clone(),
                    timestamp: self.clock.now(),
                });
                return PollOutcome::Stale(job.id);
            }
            Err(e) => {
                // The lease expires and another worker picks the job up.
                self.fault_streak = self.fault_streak.saturating_add(1);
                if e.is_storage_fault() {
                    tracing::warn!(
                        job_id = %job.id,
                        worker_id = %self.worker_id,
                        error = %e,
                        "Failed to report outcome"
                    );
                } else {
                    tracing::error!(
                        job_id = %job.id,
                        worker_id = %self.worker_id,
                        error = %e,
                        "Outcome rejected by the store"
                    );
                }
                return PollOutcome::StorageFault(e.to_string());
            }
        };

        let timestamp = self.clock.now();
        match stored.state {
            JobState::Completed => {
                tracing::info!(job_id = %stored.id, worker_id = %self.worker_id, "Job completed successfully");
                self.emit(JobEvent::JobCompleted {
                    job_id: stored.id.clone(),
                    worker_id: self.worker_id.clone(),
                    duration_ms: elapsed.as_millis().min(u128::from(u64::MAX)) as u64,
                    timestamp,
                });
            }
            JobState::Pending => {
                let error = stored.error_message.clone().unwrap_or_default();
                let next_retry_at = stored.next_retry_at.unwrap_or(timestamp);
                tracing::warn!(
                    job_id = %stored.id,
                    worker_id = %self.worker_id,
                    attempts = stored.attempts,
                    max_retries = stored.max_retries,
                    %next_retry_at,
                    %error,
                    "Job failed, retry scheduled"
                );
                self.emit(JobEvent::JobRetryScheduled {
                    job_id: stored.id.clone(),
                    attempts: stored.attempts,
                    error,
                    next_retry_at,
                    timestamp,
                });
            }
            JobState::Dead => {
                let error = stored.error_message.clone().unwrap_or_default();
                tracing::error!(
                    job_id = %stored.id,
                    worker_id = %self.worker_id,
                    attempts = stored.attempts,
                    %error,
                    "Job exhausted its retries, moved to dead letter queue"
                );
                self.emit(JobEvent::JobQuarantined {
                    job_id: stored.id.clone(),
                    attempts: stored.attempts,
                    error,
                    timestamp,
                });
            }
            JobState::Processing | JobState::Failed => {}
        }

        PollOutcome::Processed(stored)
    }

    async fn refresh_retry_scheduler(&mut self) {
        match self.settings.load().await {
            Ok(config) => self.jobs.set_retry_scheduler(config.retry_scheduler()),
            Err(e) => tracing::warn!(
                worker_id = %self.worker_id,
                error = %e,
                "Could not reload settings, keeping the current backoff base"
            ),
        }
    }

    fn emit(&self, event: JobEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }
}

/// Back-off after `streak` consecutive storage faults: doubles from
/// `poll_interval`, capped at [`MAX_FAULT_BACKOFF`].
pub fn fault_backoff(poll_interval: Duration, streak: u32) -> Duration {
    let exponent = streak.saturating_sub(1).min(16);
    poll_interval
        .saturating_mul(1u32 << exponent)
        .min(MAX_FAULT_BACKOFF)
}
