//! Dead letter queue: inspection and manual resurrection of dead jobs.

use chrono::{DateTime, Utc};
use futures_util::{Stream, TryStreamExt, stream};
use queuectl_core::{Job, JobId, JobState, ResurrectPolicy};
use serde::Deserialize;

use super::job_repo::JobRepository;
use crate::DbError;
use crate::record::{JobRecord, truncate_millis};

const CONFLICT_RETRIES: usize = 3;

const FIRST_DEAD_PAGE: &str = r#"
SELECT * FROM job
WHERE state = $state
ORDER BY created_at ASC, id ASC
LIMIT $limit
"#;

/// Keyset page: rows strictly after the cursor `(created_at, id)`.
const NEXT_DEAD_PAGE: &str = r#"
SELECT * FROM job
WHERE state = $state
  AND (created_at > $created_at
       OR (created_at = $created_at AND id > type::thing("job", $after)))
ORDER BY created_at ASC, id ASC
LIMIT $limit
"#;

/// Position of the last row a page returned.
type Cursor = (i64, JobId);

/// Administrative view over jobs in the Dead state.
#[derive(Clone)]
pub struct DeadLetterRepository {
    jobs: JobRepository,
}

impl DeadLetterRepository {
    pub fn new(jobs: JobRepository) -> Self {
        Self { jobs }
    }

    /// All dead jobs, oldest first.
    pub async fn list(&self) -> Result<Vec<Job>, DbError> {
        self.jobs.list_by_state(JobState::Dead).await
    }

    /// Dead jobs page by page, oldest first.
    ///
    /// Each page is a separate query that resumes after the last job seen, so
    /// retrying jobs while the stream is consumed never skips the ones that
    /// are still dead. Start a new stream to restart.
    pub fn stream(&self, page_size: usize) -> impl Stream<Item = Result<Job, DbError>> + 'static {
        let jobs = self.jobs.clone();
        let page_size = page_size.max(1);

        stream::try_unfold(None, move |cursor: Option<Cursor>| {
            let jobs = jobs.clone();
            async move {
                let page = dead_page(&jobs, cursor.as_ref(), page_size).await?;

                let Some(last) = page.last() else {
                    return Ok::<_, DbError>(None);
                };
                let next_cursor = (last.created_at.timestamp_millis(), last.id.clone());

                let items = stream::iter(page.into_iter().map(Ok::<Job, DbError>));
                Ok(Some((items, Some(next_cursor))))
            }
        })
        .try_flatten()
    }

    /// Return a dead job to Pending so it is claimable immediately.
    ///
    /// Fails with `NotFound` when the job does not exist or is not dead.
    pub async fn retry(
        &self,
        id: &JobId,
        policy: ResurrectPolicy,
        now: DateTime<Utc>,
    ) -> Result<Job, DbError> {
        let now = truncate_millis(now);

        for _ in 0..CONFLICT_RETRIES {
            let current = match self.jobs.find(id).await? {
                Some(job) if job.state == JobState::Dead => job,
                _ => return Err(DbError::NotFound(id.clone())),
            };

            let next = self.jobs.state_machine().resurrect(&current, policy, now)?;

            match self.jobs.compare_and_swap(&current, &next).await {
                Ok(Some(job)) => {
                    tracing::info!(job_id = %id, ?policy, "Dead job returned to pending");
                    return Ok(job);
                }
                // Someone else changed the row; re-read and decide again.
                Ok(None) => continue,
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }

        Err(DbError::NotFound(id.clone()))
    }

    /// Number of dead jobs.
    pub async fn count(&self) -> Result<u64, DbError> {
        #[derive(Deserialize)]
        struct Count {
            count: i64,
        }

        let mut response = self
            .jobs
            .database()
            .query("SELECT count() AS count FROM job WHERE state = $state GROUP ALL")
            .bind(("state", JobState::Dead.as_str()))
            .await?;
        let row: Option<Count> = response.take(0)?;

        Ok(row.map(|r| r.count.max(0) as u64).unwrap_or(0))
    }
}

async fn dead_page(
    jobs: &JobRepository,
    after: Option<&Cursor>,
    page_size: usize,
) -> Result<Vec<Job>, DbError> {
    let limit = i64::try_from(page_size).unwrap_or(i64::MAX);
    let db = jobs.database();

    let request = match after {
        None => db.query(FIRST_DEAD_PAGE),
        Some((created_at, id)) => db
            .query(NEXT_DEAD_PAGE)
            .bind(("created_at", *created_at))
            .bind(("after", id.to_string())),
    };

    let mut response = request
        .bind(("state", JobState::Dead.as_str()))
        .bind(("limit", limit))
        .await?;
    let records: Vec<JobRecord> = response.take(0)?;

    records.into_iter().map(|r| r.into_job(None)).collect()
}
