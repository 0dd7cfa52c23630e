mod common;

use std::error::Error;

use futures_util::TryStreamExt;
use queuectl_core::{ExecOutcome, JobId, JobState, QueueConfig, ResurrectPolicy};

use common::{at, lease};
use db::DbError;
use db::repositories::JobFilter;

#[tokio::test]
async fn test_enqueue_and_get() -> Result<(), Box<dyn Error>> {
    let jobs = common::setup_jobs().await?;

    let created = jobs.enqueue(JobId::new("job1"), "echo hi", 3, at(0)).await?;
    assert_eq!(created.id.as_str(), "job1");
    assert_eq!(created.state, JobState::Pending);
    assert_eq!(created.attempts, 0);
    assert_eq!(created.created_at, at(0));
    assert_eq!(created.updated_at, at(0));
    assert!(created.locked_by.is_none());

    let loaded = jobs.get(&JobId::new("job1")).await?;
    assert_eq!(loaded, created);

    let missing = jobs.get(&JobId::new("nope")).await;
    assert!(matches!(missing, Err(DbError::NotFound(_))));
    assert!(jobs.find(&JobId::new("nope")).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_enqueue_duplicate_id_is_rejected() -> Result<(), Box<dyn Error>> {
    let jobs = common::setup_jobs().await?;

    jobs.enqueue(JobId::new("dup"), "true", 3, at(0)).await?;
    let second = jobs.enqueue(JobId::new("dup"), "false", 1, at(1)).await;
    assert!(matches!(second, Err(DbError::DuplicateId(ref id)) if id.as_str() == "dup"));

    // The original row is untouched.
    let stored = jobs.get(&JobId::new("dup")).await?;
    assert_eq!(stored.command, "true");
    assert_eq!(stored.max_retries, 3);

    Ok(())
}

#[tokio::test]
async fn test_list_and_counts() -> Result<(), Box<dyn Error>> {
    let jobs = common::setup_jobs().await?;

    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        jobs.enqueue(JobId::new(*id), "true", 3, at(i as i64)).await?;
    }
    jobs.claim_next("w1", lease(), at(10)).await?;

    let newest = jobs
        .list(JobFilter {
            newest_first: true,
            ..Default::default()
        })
        .await?;
    let ids: Vec<&str> = newest.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b", "a"]);

    let pending = jobs.list_by_state(JobState::Pending).await?;
    let ids: Vec<&str> = pending.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);

    let limited = jobs
        .list(JobFilter {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        })
        .await?;
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id.as_str(), "b");

    let stats = jobs.count_by_state().await?;
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.processing, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.total(), 3);

    Ok(())
}

#[tokio::test]
async fn test_count_on_empty_store() -> Result<(), Box<dyn Error>> {
    let (jobs, dlq, _) = common::setup_all().await?;

    let stats = jobs.count_by_state().await?;
    assert_eq!(stats.total(), 0);
    assert_eq!(dlq.count().await?, 0);
    assert!(dlq.list().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_settings_roundtrip() -> Result<(), Box<dyn Error>> {
    let (_, _, settings) = common::setup_all().await?;

    assert_eq!(settings.load().await?, QueueConfig::default());

    let updated = settings.set("max-retries", "5", at(0)).await?;
    assert_eq!(updated.max_retries, 5);
    settings.set("backoff_base", "3", at(1)).await?;

    let loaded = settings.load().await?;
    assert_eq!(loaded.max_retries, 5);
    assert_eq!(loaded.backoff_base, 3);
    assert_eq!(loaded.lease_duration_secs, QueueConfig::default().lease_duration_secs);

    let bad = settings.set("backoff-base", "0", at(2)).await;
    assert!(matches!(bad, Err(DbError::Config(_))));
    let unknown = settings.set("colour", "blue", at(2)).await;
    assert!(matches!(unknown, Err(DbError::Config(_))));
    assert_eq!(settings.load().await?.backoff_base, 3);

    settings.set("poll-interval", "50", at(3)).await?;
    let loaded = settings.load().await?;
    assert_eq!(loaded.poll_interval_ms, 50);
    assert_eq!(loaded.backoff_base, 3);

    settings.reset().await?;
    assert_eq!(settings.load().await?, QueueConfig::default());

    Ok(())
}

async fn kill(jobs: &db::repositories::JobRepository, id: &str) -> Result<(), Box<dyn Error>> {
    let id = JobId::new(id);
    jobs.enqueue(id.clone(), "false", 0, at(0)).await?;
    let claimed = jobs.claim_next("w1", lease(), at(1)).await?;
    assert_eq!(claimed.map(|j| j.id), Some(id.clone()));
    let dead = jobs
        .report_outcome(&id, "w1", &ExecOutcome::failure("boom"), at(2))
        .await?;
    assert_eq!(dead.state, JobState::Dead);
    Ok(())
}

#[tokio::test]
async fn test_dlq_list_count_and_retry() -> Result<(), Box<dyn Error>> {
    let (jobs, dlq, _) = common::setup_all().await?;
    kill(&jobs, "d1").await?;
    kill(&jobs, "d2").await?;

    assert_eq!(dlq.count().await?, 2);
    let dead = dlq.list().await?;
    assert_eq!(dead.len(), 2);
    assert!(dead.iter().all(|j| j.error_message.as_deref() == Some("boom")));

    let revived = dlq
        .retry(&JobId::new("d1"), ResurrectPolicy::ResetAttempts, at(10))
        .await?;
    assert_eq!(revived.state, JobState::Pending);
    assert_eq!(revived.attempts, 0);
    assert!(revived.error_message.is_none());
    assert!(revived.next_retry_at.is_none());
    assert_eq!(dlq.count().await?, 1);

    // Claimable immediately.
    let claimed = jobs.claim_next("w2", lease(), at(10)).await?;
    assert_eq!(claimed.map(|j| j.id.to_string()), Some("d1".to_string()));

    let preserved = dlq
        .retry(&JobId::new("d2"), ResurrectPolicy::PreserveAttempts, at(11))
        .await?;
    assert_eq!(preserved.attempts, 1);
    assert_eq!(preserved.max_retries, 1);

    Ok(())
}

#[tokio::test]
async fn test_dlq_retry_requires_dead_job() -> Result<(), Box<dyn Error>> {
    let (jobs, dlq, _) = common::setup_all().await?;
    jobs.enqueue(JobId::new("alive"), "true", 3, at(0)).await?;

    let missing = dlq
        .retry(&JobId::new("ghost"), ResurrectPolicy::default(), at(1))
        .await;
    assert!(matches!(missing, Err(DbError::NotFound(_))));

    let pending = dlq
        .retry(&JobId::new("alive"), ResurrectPolicy::default(), at(1))
        .await;
    assert!(matches!(pending, Err(DbError::NotFound(_))));
    assert_eq!(jobs.get(&JobId::new("alive")).await?.state, JobState::Pending);

    Ok(())
}

#[tokio::test]
async fn test_dlq_stream_pages_through_all_dead_jobs() -> Result<(), Box<dyn Error>> {
    let (jobs, dlq, _) = common::setup_all().await?;
    for id in ["s1", "s2", "s3", "s4", "s5"] {
        kill(&jobs, id).await?;
    }

    let streamed: Vec<_> = dlq.stream(2).try_collect().await?;
    assert_eq!(streamed.len(), 5);
    assert!(streamed.iter().all(|j| j.state == JobState::Dead));

    // A fresh stream starts over.
    let again: Vec<_> = dlq.stream(10).try_collect().await?;
    assert_eq!(again.len(), 5);

    Ok(())
}

#[tokio::test]
async fn test_dlq_stream_survives_retries_while_consumed() -> Result<(), Box<dyn Error>> {
    let (jobs, dlq, _) = common::setup_all().await?;
    for id in ["d0", "d1", "d2", "d3"] {
        kill(&jobs, id).await?;
    }

    let mut stream = std::pin::pin!(dlq.stream(2));
    let mut seen = Vec::new();
    while let Some(job) = stream.try_next().await? {
        dlq.retry(&job.id, ResurrectPolicy::ResetAttempts, at(10))
            .await?;
        seen.push(job.id.to_string());
    }

    assert_eq!(seen, vec!["d0", "d1", "d2", "d3"]);
    assert_eq!(dlq.count().await?, 0);
    Ok(())
}
