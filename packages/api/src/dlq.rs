//! Dead letter queue administration.

use futures_util::Stream;
use queuectl_core::{Job, JobEvent, JobId, ResurrectPolicy};

use crate::{ApiError, Queuectl};

impl Queuectl {
    /// All dead jobs, oldest first.
    pub async fn dlq_list(&self) -> Result<Vec<Job>, ApiError> {
        Ok(self.dlq.list().await?)
    }

    /// Dead jobs as a paged stream.
    pub fn dlq_stream(
        &self,
        page_size: usize,
    ) -> impl Stream<Item = Result<Job, db::DbError>> + 'static {
        self.dlq.stream(page_size)
    }

    /// Put a dead job back to Pending with a fresh attempt budget.
    pub async fn dlq_retry(&self, id: &JobId) -> Result<Job, ApiError> {
        self.dlq_retry_with(id, ResurrectPolicy::default()).await
    }

    pub async fn dlq_retry_with(
        &self,
        id: &JobId,
        policy: ResurrectPolicy,
    ) -> Result<Job, ApiError> {
        let job = self.dlq.retry(id, policy, self.clock.now()).await?;
        self.emit(JobEvent::JobResurrected {
            job_id: job.id.clone(),
            timestamp: job.updated_at,
        });
        Ok(job)
    }
}
