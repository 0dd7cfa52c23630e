//! Errors returned by the command surface.

use thiserror::Error;

use actors::WorkerError;
use db::DbError;
use queuectl_core::ParseStateError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid job specification: {0}")]
    InvalidSpec(String),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    State(#[from] ParseStateError),
}

impl ApiError {
    /// Whether the request was rejected because of a duplicate job ID.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ApiError::Database(DbError::DuplicateId(_)))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Database(DbError::NotFound(_)))
    }
}
