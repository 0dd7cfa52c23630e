//! Exponential backoff computation for failed jobs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default exponent base for backoff delays.
pub const DEFAULT_BACKOFF_BASE: u32 = 2;

/// Upper bound on a single backoff delay (one year).
pub const MAX_BACKOFF_SECS: u64 = 365 * 24 * 60 * 60;

/// What to do with a job whose execution just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the job back to Pending, claimable from `next_retry_at`.
    Retry {
        delay: Duration,
        next_retry_at: DateTime<Utc>,
    },
    /// Move the job to the dead letter queue.
    Quarantine,
}

/// Stateless backoff calculator: `delay = backoff_base ^ attempts` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryScheduler {
    backoff_base: u32,
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE)
    }
}

impl RetryScheduler {
    pub fn new(backoff_base: u32) -> Self {
        Self { backoff_base }
    }

    pub fn backoff_base(&self) -> u32 {
        self.backoff_base
    }

    /// Backoff delay after the `attempts`-th execution failed.
    pub fn delay(&self, attempts: u32) -> Duration {
        let secs = u64::from(self.backoff_base)
            .saturating_pow(attempts)
            .min(MAX_BACKOFF_SECS);
        // Bounded by MAX_BACKOFF_SECS, so the cast cannot truncate.
        Duration::seconds(secs as i64)
    }

    /// Decide between retrying and quarantining a job.
    ///
    /// `attempts` is the post-increment count of executions started so far.
    pub fn compute(&self, attempts: u32, max_retries: u32, now: DateTime<Utc>) -> RetryDecision {
        if attempts > max_retries {
            return RetryDecision::Quarantine;
        }
        let delay = self.delay(attempts);
        RetryDecision::Retry {
            delay,
            next_retry_at: now + delay,
        }
    }
}
