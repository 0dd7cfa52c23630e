#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};

use db::repositories::{DeadLetterRepository, JobRepository, SettingsRepository};
use db::{Database, DbConfig, DbError};

/// A fresh in-memory store per test; nothing is shared between tests.
pub async fn setup_db() -> Result<Database, DbError> {
    db::init(&DbConfig::memory()).await
}

pub async fn setup_jobs() -> Result<JobRepository, DbError> {
    Ok(JobRepository::new(setup_db().await?))
}

pub async fn setup_all() -> Result<(JobRepository, DeadLetterRepository, SettingsRepository), DbError>
{
    let db = setup_db().await?;
    let jobs = JobRepository::new(db.clone());
    Ok((
        jobs.clone(),
        DeadLetterRepository::new(jobs),
        SettingsRepository::new(db),
    ))
}

/// Fixed reference instant so timing assertions are exact.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

pub fn lease() -> Duration {
    Duration::seconds(30)
}
