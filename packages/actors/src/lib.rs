//! Actor system for the job queue workers.
//!
//! This crate provides the Ractor-based worker pool: each worker is an actor
//! running a sequential claim → execute → report loop against the shared
//! store, and a supervisor owns the workers of one pool.
//!
//! # Architecture
//!
//! - `Supervisor` - Spawns linked workers, restarts failed ones, drains on shutdown
//! - `WorkerActor` - Drives one `WorkerLoop` with self-sent `Poll` messages
//! - `WorkerLoop` - The poll loop itself, usable without actors
//!
//! # Usage
//!
//! ```ignore
//! use actors::{ShellExecutor, WorkerPool};
//!
//! let pool = WorkerPool::start(jobs, Arc::new(ShellExecutor::new()), config, 4).await?;
//! // ...
//! pool.shutdown().await?;
//! ```

mod executor;
mod messages;
mod shutdown;
mod supervisor;
mod worker;
mod worker_actor;

pub use executor::{CommandExecutor, ExecFuture, FnExecutor, ShellExecutor};
pub use messages::{SupervisorMessage, WorkerError, WorkerMessage};
pub use shutdown::install_shutdown_handler;
pub use supervisor::{Supervisor, SupervisorArgs, WorkerPool, WorkerPoolBuilder, WorkerTemplate};
pub use worker::{MAX_FAULT_BACKOFF, PollOutcome, WorkerLoop, fault_backoff};
pub use worker_actor::WorkerActor;

pub use tokio_util::sync::CancellationToken;
