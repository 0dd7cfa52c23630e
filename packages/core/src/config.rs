//! Queue-wide configuration shared by producers and workers.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::DEFAULT_MAX_RETRIES;
use crate::retry::{DEFAULT_BACKOFF_BASE, MAX_BACKOFF_SECS, RetryScheduler};

/// Configuration errors, raised when a key or value is rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: ConfigKey,
        value: String,
        reason: String,
    },
}

/// Recognized configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigKey {
    /// Default retry ceiling for newly enqueued jobs.
    MaxRetries,
    /// Exponent base for backoff delays.
    BackoffBase,
    /// Seconds a claim is honored before other workers may reclaim it.
    LeaseDuration,
    /// Milliseconds an idle worker sleeps between claim attempts.
    PollInterval,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 4] = [
        ConfigKey::MaxRetries,
        ConfigKey::BackoffBase,
        ConfigKey::LeaseDuration,
        ConfigKey::PollInterval,
    ];

    /// Name accepted by `config set`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::MaxRetries => "max-retries",
            ConfigKey::BackoffBase => "backoff-base",
            ConfigKey::LeaseDuration => "lease-duration",
            ConfigKey::PollInterval => "poll-interval",
        }
    }

    /// Name of the field in [`QueueConfig`] and in the persisted settings record.
    pub fn field(&self) -> &'static str {
        match self {
            ConfigKey::MaxRetries => "max_retries",
            ConfigKey::BackoffBase => "backoff_base",
            ConfigKey::LeaseDuration => "lease_duration_secs",
            ConfigKey::PollInterval => "poll_interval_ms",
        }
    }

    fn minimum(&self) -> u64 {
        match self {
            ConfigKey::MaxRetries => 0,
            ConfigKey::BackoffBase | ConfigKey::LeaseDuration | ConfigKey::PollInterval => 1,
        }
    }

    fn maximum(&self) -> u64 {
        match self {
            ConfigKey::MaxRetries | ConfigKey::BackoffBase => u64::from(u32::MAX),
            // One year; `now - lease` must stay representable.
            ConfigKey::LeaseDuration => MAX_BACKOFF_SECS,
            ConfigKey::PollInterval => i64::MAX as u64 / 1_000,
        }
    }

    /// Parse and range-check a raw value for this key.
    pub fn parse_value(&self, value: &str) -> Result<u64, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: *self,
            value: value.to_string(),
            reason,
        };
        let parsed: u64 = value
            .trim()
            .parse()
            .map_err(|_| invalid("must be a non-negative integer".into()))?;
        if parsed < self.minimum() {
            return Err(invalid(format!("must be at least {}", self.minimum())));
        }
        if parsed > self.maximum() {
            return Err(invalid(format!("must be at most {}", self.maximum())));
        }
        Ok(parsed)
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "max-retries" => Ok(ConfigKey::MaxRetries),
            "backoff-base" => Ok(ConfigKey::BackoffBase),
            "lease-duration" | "lease-duration-secs" => Ok(ConfigKey::LeaseDuration),
            "poll-interval" | "poll-interval-ms" => Ok(ConfigKey::PollInterval),
            _ => Err(ConfigError::UnknownKey(s.to_string())),
        }
    }
}

/// Configuration for queue behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Default max retries for newly enqueued jobs.
    pub max_retries: u32,
    /// Exponent base for retry backoff.
    pub backoff_base: u32,
    /// Lease duration in seconds.
    pub lease_duration_secs: u64,
    /// Idle poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            lease_duration_secs: 300,
            poll_interval_ms: 1_000,
        }
    }
}

impl QueueConfig {
    /// Set a single key from its textual value, validating it first.
    pub fn set(&mut self, key: &str, value: &str) -> Result<ConfigKey, ConfigError> {
        let key: ConfigKey = key.parse()?;
        let parsed = key.parse_value(value)?;
        // parse_value bounds u32 keys by u32::MAX.
        match key {
            ConfigKey::MaxRetries => self.max_retries = parsed as u32,
            ConfigKey::BackoffBase => self.backoff_base = parsed as u32,
            ConfigKey::LeaseDuration => self.lease_duration_secs = parsed,
            ConfigKey::PollInterval => self.poll_interval_ms = parsed,
        }
        Ok(key)
    }

    /// Current value of a key.
    pub fn get(&self, key: ConfigKey) -> u64 {
        match key {
            ConfigKey::MaxRetries => u64::from(self.max_retries),
            ConfigKey::BackoffBase => u64::from(self.backoff_base),
            ConfigKey::LeaseDuration => self.lease_duration_secs,
            ConfigKey::PollInterval => self.poll_interval_ms,
        }
    }

    /// All keys with their current values, for display.
    pub fn entries(&self) -> Vec<(ConfigKey, u64)> {
        ConfigKey::ALL.iter().map(|k| (*k, self.get(*k))).collect()
    }

    /// Check every field against its key's bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in self.entries() {
            key.parse_value(&value.to_string())?;
        }
        Ok(())
    }

    pub fn lease_duration(&self) -> chrono::Duration {
        // The field is public, so it may not have passed `set`.
        chrono::Duration::seconds(self.lease_duration_secs.min(MAX_BACKOFF_SECS) as i64)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_scheduler(&self) -> RetryScheduler {
        RetryScheduler::new(self.backoff_base)
    }
}
