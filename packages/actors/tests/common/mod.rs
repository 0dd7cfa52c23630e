#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use db::repositories::JobRepository;
use db::{DbConfig, DbError};
use queuectl_core::{JobEvent, QueueConfig};
use tokio::sync::broadcast;

pub async fn setup_jobs() -> Result<JobRepository, DbError> {
    let db = db::init(&DbConfig::memory()).await?;
    Ok(JobRepository::new(db))
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// Settings that keep tests fast.
pub fn fast_config() -> QueueConfig {
    QueueConfig {
        poll_interval_ms: 10,
        ..QueueConfig::default()
    }
}

/// Poll `check` until it returns true or `limit` elapses.
pub async fn wait_until<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check().await
}

/// Drain every event currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
