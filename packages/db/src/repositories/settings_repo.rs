//! Queue-wide settings persisted alongside the jobs.

use chrono::{DateTime, Utc};
use queuectl_core::QueueConfig;

use crate::{Database, DbError};

const SETTINGS_ID: &str = "queue";

/// Repository for the single `settings:queue` record.
///
/// Keys that were never set fall back to [`QueueConfig::default`].
#[derive(Clone)]
pub struct SettingsRepository {
    db: Database,
}

impl SettingsRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load the current settings.
    pub async fn load(&self) -> Result<QueueConfig, DbError> {
        let stored: Option<QueueConfig> = self.db.select(("settings", SETTINGS_ID)).await?;
        let config = stored.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Validate and persist one key. Only that field is written, so concurrent
    /// updates to different keys do not overwrite each other.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<QueueConfig, DbError> {
        let mut config = self.load().await?;
        let key = config.set(key, value)?;
        let stored = config.get(key) as i64;

        let query = format!(
            "UPSERT type::thing('settings', $id) SET {} = $value, updated_at = $now",
            key.field()
        );
        self.db
            .query(&query)
            .bind(("id", SETTINGS_ID))
            .bind(("value", stored))
            .bind(("now", now.timestamp_millis()))
            .await?
            .check()?;

        tracing::info!(key = %key, value = stored, "Queue setting updated");
        Ok(config)
    }

    /// Drop every stored key, reverting to defaults.
    pub async fn reset(&self) -> Result<(), DbError> {
        self.db
            .query("DELETE type::thing('settings', $id)")
            .bind(("id", SETTINGS_ID))
            .await?
            .check()?;
        Ok(())
    }
}
