//! Job repository: the shared job table and its claim/report protocol.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use queuectl_core::{
    ConfigError, ConfigKey, ExecOutcome, Job, JobId, JobState, JobStateMachine, QueueStats,
    RetryScheduler,
};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::record::{JobRecord, truncate_millis};
use crate::{Database, DbError};

/// Candidates fetched per claim attempt.
const CLAIM_BATCH: i64 = 16;

/// Conditional writes retried after a store-level conflict before giving up.
const CONFLICT_RETRIES: usize = 3;

/// Claimable rows, oldest-eligible first.
const CLAIM_CANDIDATES: &str = r#"
SELECT * FROM job
WHERE (state = "pending" AND (next_retry_at = NONE OR next_retry_at <= $now))
   OR (state = "processing" AND locked_at < $expired_before)
ORDER BY eligible_at ASC, created_at ASC
LIMIT $batch
"#;

/// Replace a row only if it is still exactly the version that was read.
const COMPARE_AND_SWAP: &str = r#"
UPDATE type::thing("job", $id) CONTENT $next
WHERE state = $state
  AND attempts = $attempts
  AND updated_at = $updated_at
  AND locked_by = $locked_by
  AND locked_at = $locked_at
RETURN AFTER
"#;

/// Filter options for listing jobs.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub state: Option<JobState>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Newest first when set; oldest first otherwise.
    pub newest_first: bool,
}

impl JobFilter {
    pub fn state(state: JobState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }
}

/// Repository for job persistence operations.
///
/// All mutations go through [`JobRepository::compare_and_swap`]: a single
/// conditional update that only matches the row version the caller read.
///
/// The embedded engines do not isolate two concurrent conditional updates of
/// one row from each other, so the update is also serialised by a write lock
/// shared between clones. Create one repository per database handle and clone
/// it; repositories built separately over the same handle do not share the
/// lock. Worker processes on different hosts reach the store through the
/// `remote` engine, where the server's transactions reject the losing write.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
    machine: JobStateMachine,
    write_lock: Arc<Mutex<()>>,
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            machine: JobStateMachine::default(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Use `scheduler` for failure transitions reported through this repository.
    pub fn with_retry_scheduler(mut self, scheduler: RetryScheduler) -> Self {
        self.set_retry_scheduler(scheduler);
        self
    }

    pub fn set_retry_scheduler(&mut self, scheduler: RetryScheduler) {
        self.machine = JobStateMachine::new(scheduler);
    }

    pub fn state_machine(&self) -> &JobStateMachine {
        &self.machine
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Insert a new Pending job. Fails with `DuplicateId` if the id is taken.
    pub async fn enqueue(
        &self,
        id: JobId,
        command: impl Into<String>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<Job, DbError> {
        let job = Job::new_at(id, command, truncate_millis(now)).with_max_retries(max_retries);
        let record = JobRecord::from_job(&job);

        let created: Result<Option<JobRecord>, surrealdb::Error> = self
            .db
            .create(("job", job.id.as_str()))
            .content(record)
            .await;

        match created {
            Ok(Some(record)) => {
                tracing::debug!(job_id = %job.id, "Job enqueued");
                record.into_job(Some(&job.id))
            }
            Ok(None) => Err(DbError::Query("Failed to create job".into())),
            Err(e) => {
                if self.find(&job.id).await?.is_some() {
                    Err(DbError::DuplicateId(job.id))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Get a job by ID.
    pub async fn get(&self, id: &JobId) -> Result<Job, DbError> {
        self.find(id)
            .await?
            .ok_or_else(|| DbError::NotFound(id.clone()))
    }

    /// Get a job by ID, if it exists.
    pub async fn find(&self, id: &JobId) -> Result<Option<Job>, DbError> {
        let record: Option<JobRecord> = self.db.select(("job", id.as_str())).await?;
        record.map(|r| r.into_job(Some(id))).transpose()
    }

    /// List jobs with optional filtering.
    pub async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, DbError> {
        let where_clause = if filter.state.is_some() {
            "WHERE state = $state"
        } else {
            ""
        };

        let order = if filter.newest_first { "DESC" } else { "ASC" };

        let limit_clause = filter
            .limit
            .map(|l| format!("LIMIT {}", l))
            .unwrap_or_default();

        let offset_clause = filter
            .offset
            .map(|o| format!("START {}", o))
            .unwrap_or_default();

        let query = format!(
            "SELECT * FROM job {} ORDER BY created_at {}, id {} {} {}",
            where_clause, order, order, limit_clause, offset_clause
        );

        let mut request = self.db.query(&query);
        if let Some(state) = filter.state {
            request = request.bind(("state", state.as_str()));
        }

        let mut response = request.await?;
        let records: Vec<JobRecord> = response.take(0)?;

        records.into_iter().map(|r| r.into_job(None)).collect()
    }

    /// List every job in `state`, oldest first.
    pub async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>, DbError> {
        self.list(JobFilter::state(state)).await
    }

    /// Count jobs per state.
    pub async fn count_by_state(&self) -> Result<QueueStats, DbError> {
        #[derive(Deserialize)]
        struct StateCount {
            state: JobState,
            count: i64,
        }

        let mut response = self
            .db
            .query("SELECT state, count() AS count FROM job GROUP BY state")
            .await?;
        let rows: Vec<StateCount> = response.take(0)?;

        let counts: HashMap<JobState, u64> = rows
            .into_iter()
            .map(|row| (row.state, row.count.max(0) as u64))
            .collect();

        Ok(QueueStats::from_counts(&counts))
    }

    /// Atomically claim the oldest eligible job for `worker_id`.
    ///
    /// Returns `Ok(None)` when nothing is eligible or every candidate was taken
    /// by a concurrent claim. A miss is never an error; callers poll again.
    pub async fn claim_next(
        &self,
        worker_id: &str,
        lease_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, DbError> {
        let now = truncate_millis(now);
        let expired_before = now.checked_sub_signed(lease_duration).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: ConfigKey::LeaseDuration,
                value: lease_duration.num_seconds().to_string(),
                reason: "lease expiry falls outside the representable time range".into(),
            }
        })?;

        let mut response = self
            .db
            .query(CLAIM_CANDIDATES)
            .bind(("now", now.timestamp_millis()))
            .bind(("expired_before", expired_before.timestamp_millis()))
            .bind(("batch", CLAIM_BATCH))
            .await?;
        let candidates: Vec<JobRecord> = response.take(0)?;

        for record in candidates {
            let prior = record.into_job(None)?;
            let Ok(next) = self.machine.claim(&prior, worker_id, lease_duration, now) else {
                continue;
            };

            match self.compare_and_swap(&prior, &next).await {
                Ok(Some(job)) => {
                    if prior.state == JobState::Processing {
                        tracing::info!(
                            job_id = %job.id,
                            worker_id,
                            previous_owner = prior.locked_by.as_deref().unwrap_or_default(),
                            "Reclaimed job with expired lease"
                        );
                    }
                    return Ok(Some(job));
                }
                Ok(None) => continue,
                Err(e) if e.is_conflict() => {
                    tracing::debug!(job_id = %prior.id, worker_id, "Claim lost to a concurrent writer");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// Record the executor's outcome for a job leased to `worker_id`.
    ///
    /// Fails with `StaleClaim` when the lease now belongs to someone else (or
    /// the job left Processing); the row is left untouched in that case.
    pub async fn report_outcome(
        &self,
        job_id: &JobId,
        worker_id: &str,
        outcome: &ExecOutcome,
        now: DateTime<Utc>,
    ) -> Result<Job, DbError> {
        let now = truncate_millis(now);

        for _ in 0..CONFLICT_RETRIES {
            let current = self.get(job_id).await?;
            if !current.is_held_by(worker_id) {
                return Err(stale(job_id, worker_id));
            }

            let next = match outcome {
                ExecOutcome::Success => self.machine.complete(&current, now)?,
                ExecOutcome::Failure(message) => self.machine.fail(&current, message, now)?,
            };

            match self.compare_and_swap(&current, &next).await {
                Ok(Some(job)) => return Ok(job),
                Ok(None) => return Err(stale(job_id, worker_id)),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }

        Err(stale(job_id, worker_id))
    }

    /// Replace `prior` with `next` if the stored row still matches `prior`.
    ///
    /// Returns the stored row on success and `None` if another writer got
    /// there first.
    pub(crate) async fn compare_and_swap(
        &self,
        prior: &Job,
        next: &Job,
    ) -> Result<Option<Job>, DbError> {
        let prior_record = JobRecord::from_job(prior);

        let _guard = self.write_lock.lock().await;
        let mut response = self
            .db
            .query(COMPARE_AND_SWAP)
            .bind(("id", prior.id.to_string()))
            .bind(("next", JobRecord::from_job(next)))
            .bind(("state", prior_record.state.as_str()))
            .bind(("attempts", prior_record.attempts))
            .bind(("updated_at", prior_record.updated_at))
            .bind(("locked_by", prior_record.locked_by))
            .bind(("locked_at", prior_record.locked_at))
            .await?;

        let records: Vec<JobRecord> = response.take(0)?;

        records
            .into_iter()
            .next()
            .map(|r| r.into_job(Some(&prior.id)))
            .transpose()
    }
}

fn stale(job_id: &JobId, worker_id: &str) -> DbError {
    DbError::StaleClaim {
        job_id: job_id.clone(),
        worker_id: worker_id.to_string(),
    }
}
