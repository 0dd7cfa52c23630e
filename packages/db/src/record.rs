//! Row representation of a job in SurrealDB.

use chrono::{DateTime, Utc};
use queuectl_core::{Job, JobId, JobState};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::DbError;

/// Internal record type for SurrealDB. Timestamps are epoch milliseconds so
/// the store can compare them numerically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct JobRecord {
    #[serde(default, skip_serializing)]
    pub id: Option<Thing>,
    pub command: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_retries: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub eligible_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<i64>,
}

impl JobRecord {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: None,
            command: job.command.clone(),
            state: job.state,
            attempts: job.attempts,
            max_retries: job.max_retries,
            created_at: job.created_at.timestamp_millis(),
            updated_at: job.updated_at.timestamp_millis(),
            eligible_at: job.eligible_at().timestamp_millis(),
            next_retry_at: job.next_retry_at.map(|t| t.timestamp_millis()),
            error_message: job.error_message.clone(),
            locked_by: job.locked_by.clone(),
            locked_at: job.locked_at.map(|t| t.timestamp_millis()),
        }
    }

    /// Convert into a domain job. `id` is used when the row carries no record id.
    pub fn into_job(self, id: Option<&JobId>) -> Result<Job, DbError> {
        let job_id = match (self.id.as_ref(), id) {
            (Some(thing), _) => JobId::new(thing.id.to_raw()),
            (None, Some(id)) => id.clone(),
            (None, None) => {
                return Err(DbError::Serialization("job row without an id".into()));
            }
        };
        Ok(Job {
            id: job_id,
            command: self.command,
            state: self.state,
            attempts: self.attempts,
            max_retries: self.max_retries,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
            next_retry_at: self.next_retry_at.map(from_millis).transpose()?,
            error_message: self.error_message,
            locked_by: self.locked_by,
            locked_at: self.locked_at.map(from_millis).transpose()?,
        })
    }
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::Serialization(format!("timestamp out of range: {}", ms)))
}

/// Drop sub-millisecond precision so in-memory values match what is stored.
pub(crate) fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}
