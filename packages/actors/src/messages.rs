//! Message types for actor communication.

use ractor::RpcReplyPort;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run one claim → execute → report cycle, then schedule the next.
    Poll,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// IDs of the workers currently running.
    ListWorkers { reply: RpcReplyPort<Vec<String>> },

    /// Cancel every worker and reply once all of them have stopped.
    Shutdown { reply: RpcReplyPort<()> },
}

/// Error type for actor operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker count must be at least 1")]
    NoWorkers,

    #[error("Failed to spawn actor: {0}")]
    Spawn(#[from] ractor::SpawnErr),

    #[error("Actor error: {0}")]
    Actor(String),
}
