#![allow(dead_code)]

use std::sync::Arc;

use api::{ApiError, DbConfig, Queuectl};
use chrono::{DateTime, TimeZone, Utc};
use queuectl_core::ManualClock;

pub async fn setup() -> Result<Queuectl, ApiError> {
    Queuectl::open(&DbConfig::memory()).await
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// A facade whose clock only moves when the test says so.
pub async fn setup_with_clock() -> Result<(Queuectl, Arc<ManualClock>), ApiError> {
    let clock = Arc::new(ManualClock::new(t0()));
    let queuectl = setup().await?.with_clock(clock.clone());
    Ok((queuectl, clock))
}
