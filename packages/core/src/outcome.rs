//! Result of handing a command to an executor.

use serde::{Deserialize, Serialize};

/// Outcome reported by a worker after the executor returns.
///
/// A failure is a business outcome that drives the retry/quarantine
/// transition; it is never a system fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum ExecOutcome {
    Success,
    Failure(String),
}

impl ExecOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        ExecOutcome::Failure(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecOutcome::Success)
    }
}
