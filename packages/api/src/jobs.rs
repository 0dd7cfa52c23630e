//! Job management: enqueue, lookup and listing.

use std::sync::Arc;

use actors::{CancellationToken, CommandExecutor, WorkerPool};
use queuectl_core::{Job, JobEvent, JobId, JobState};
use serde::{Deserialize, Serialize};

use crate::{ApiError, Queuectl};

/// Request type for creating a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub command: String,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl EnqueueRequest {
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            id: None,
            command: command.into(),
            max_retries: None,
        }
    }

    /// Parse a job spec: a JSON object `{"id"?, "command", "max_retries"?}`,
    /// or anything else taken verbatim as the command.
    pub fn parse(spec: &str) -> Result<Self, ApiError> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(ApiError::InvalidSpec("empty job specification".into()));
        }

        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value @ serde_json::Value::Object(_)) => {
                let request: EnqueueRequest = serde_json::from_value(value)
                    .map_err(|e| ApiError::InvalidSpec(e.to_string()))?;
                if request.command.trim().is_empty() {
                    return Err(ApiError::InvalidSpec("'command' must not be empty".into()));
                }
                if request.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
                    return Err(ApiError::InvalidSpec("'id' must not be empty".into()));
                }
                Ok(request)
            }
            _ => Ok(Self::command(trimmed)),
        }
    }
}

impl Queuectl {
    /// Enqueue a new Pending job.
    ///
    /// Without an id one is generated; without `max_retries` the configured
    /// default applies.
    pub async fn enqueue(
        &self,
        id: Option<JobId>,
        command: impl Into<String>,
        max_retries: Option<u32>,
    ) -> Result<Job, ApiError> {
        let max_retries = match max_retries {
            Some(n) => n,
            None => self.settings.load().await?.max_retries,
        };
        let id = id.unwrap_or_else(JobId::generate);

        let job = self
            .jobs
            .enqueue(id, command, max_retries, self.clock.now())
            .await?;

        tracing::info!(job_id = %job.id, max_retries = job.max_retries, "Job enqueued");
        self.emit(JobEvent::JobEnqueued {
            job_id: job.id.clone(),
            timestamp: job.created_at,
        });
        Ok(job)
    }

    /// Enqueue from a textual job spec, see [`EnqueueRequest::parse`].
    pub async fn enqueue_spec(&self, spec: &str) -> Result<Job, ApiError> {
        self.enqueue_request(EnqueueRequest::parse(spec)?).await
    }

    pub async fn enqueue_request(&self, request: EnqueueRequest) -> Result<Job, ApiError> {
        self.enqueue(request.id.map(JobId::new), request.command, request.max_retries)
            .await
    }

    /// Get a job by ID.
    pub async fn get(&self, id: &JobId) -> Result<Job, ApiError> {
        Ok(self.jobs.get(id).await?)
    }

    /// List jobs, newest first, optionally restricted to one state.
    pub async fn list(
        &self,
        state: Option<JobState>,
        limit: Option<usize>,
    ) -> Result<Vec<Job>, ApiError> {
        let filter = db::repositories::JobFilter {
            state,
            limit,
            newest_first: true,
            ..Default::default()
        };
        Ok(self.jobs.list(filter).await?)
    }

    /// Like [`Queuectl::list`], with the state given by name.
    pub async fn list_by_name(
        &self,
        state: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Job>, ApiError> {
        let state = state.map(str::parse::<JobState>).transpose()?;
        self.list(state, limit).await
    }

    /// Start `count` workers using the stored configuration.
    pub async fn start_workers(
        &self,
        count: usize,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<WorkerPool, ApiError> {
        self.start_workers_until(count, executor, CancellationToken::new())
            .await
    }

    /// Start `count` workers that stop once `cancel` fires.
    pub async fn start_workers_until(
        &self,
        count: usize,
        executor: Arc<dyn CommandExecutor>,
        cancel: CancellationToken,
    ) -> Result<WorkerPool, ApiError> {
        let config = self.settings.load().await?;
        tracing::info!(count, ?config, "Starting workers");

        let pool = WorkerPool::builder(self.jobs.clone(), executor, config)
            .count(count)
            .cancel_token(cancel)
            .clock(self.clock.clone())
            .events(self.event_tx.clone())
            .start()
            .await?;
        Ok(pool)
    }
}
