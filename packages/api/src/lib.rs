//! Command surface for the queuectl job queue.
//!
//! [`Queuectl`] is the facade every front end goes through:
//! - Jobs (enqueue, enqueue from a spec, get, list)
//! - Workers (start a pool, shut it down)
//! - Status and configuration (status, config set/show/reset)
//! - Dead letter queue (list, retry)
//! - Events (subscribe to job lifecycle events)

mod dlq;
mod error;
mod init;
mod jobs;
mod realtime;
mod status;

pub use error::ApiError;
pub use init::{Queuectl, init_tracing};
pub use jobs::EnqueueRequest;
pub use realtime::format_event_line;
pub use status::StatusReport;

// Re-export core types for convenience
pub use actors::{CommandExecutor, FnExecutor, ShellExecutor, WorkerPool};
pub use db::DbConfig;
pub use queuectl_core::{
    ConfigKey, ExecOutcome, Job, JobEvent, JobId, JobState, QueueConfig, QueueStats,
    ResurrectPolicy,
};
