//! Queue status and configuration.

use queuectl_core::{ConfigKey, QueueConfig, QueueStats};
use serde::{Deserialize, Serialize};

use crate::{ApiError, Queuectl};

/// Aggregate view of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub stats: QueueStats,
    pub config: QueueConfig,
}

impl Queuectl {
    /// Job counts per state plus the active configuration.
    pub async fn status(&self) -> Result<StatusReport, ApiError> {
        let stats = self.jobs.count_by_state().await?;
        let config = self.settings.load().await?;
        Ok(StatusReport { stats, config })
    }

    /// Validate and store one configuration key.
    ///
    /// `max-retries` applies to jobs enqueued afterwards; the other keys to
    /// workers started afterwards.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<QueueConfig, ApiError> {
        Ok(self.settings.set(key, value, self.clock.now()).await?)
    }

    /// Every key with its current value.
    pub async fn config_show(&self) -> Result<Vec<(ConfigKey, u64)>, ApiError> {
        Ok(self.settings.load().await?.entries())
    }

    /// Revert every key to its default.
    pub async fn config_reset(&self) -> Result<QueueConfig, ApiError> {
        self.settings.reset().await?;
        tracing::info!("Configuration reset to defaults");
        Ok(QueueConfig::default())
    }
}
