//! Core domain types for the queuectl job queue.
//!
//! This crate contains the pure parts of the coordination engine:
//! - Job and JobState for units of work
//! - RetryScheduler for exponential backoff
//! - JobStateMachine for legal transitions
//! - QueueConfig for the shared configuration
//! - Events for lifecycle notifications

mod clock;
mod config;
mod events;
mod job;
mod outcome;
mod retry;
mod state;
mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ConfigKey, QueueConfig};
pub use events::JobEvent;
pub use job::{DEFAULT_MAX_RETRIES, Job, JobId, JobState, ParseStateError};
pub use outcome::ExecOutcome;
pub use retry::{DEFAULT_BACKOFF_BASE, MAX_BACKOFF_SECS, RetryDecision, RetryScheduler};
pub use state::{JobStateMachine, ResurrectPolicy, TransitionError};
pub use stats::QueueStats;
