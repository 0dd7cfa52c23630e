//! Facade construction and process-level initialization.

use std::sync::Arc;

use db::repositories::{DeadLetterRepository, JobRepository, SettingsRepository};
use db::{Database, DbConfig};
use queuectl_core::{Clock, JobEvent, SystemClock};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use crate::ApiError;

/// Initialize tracing/logging for the process.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Safe to call
/// multiple times (subsequent calls are no-ops).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Entry point for producers, workers and administrators.
///
/// Every process that talks to the same store gets the same view; the only
/// shared state is the database.
#[derive(Clone)]
pub struct Queuectl {
    pub(crate) jobs: JobRepository,
    pub(crate) dlq: DeadLetterRepository,
    pub(crate) settings: SettingsRepository,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) event_tx: broadcast::Sender<JobEvent>,
}

impl Queuectl {
    /// Connect to the store described by `config` and make sure the schema exists.
    pub async fn open(config: &DbConfig) -> Result<Self, ApiError> {
        tracing::info!("Initializing job queue...");
        let db = db::init(config).await?;
        Ok(Self::new(db))
    }

    /// Wrap an already initialized database handle.
    pub fn new(db: Database) -> Self {
        let jobs = JobRepository::new(db.clone());
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            dlq: DeadLetterRepository::new(jobs.clone()),
            settings: SettingsRepository::new(db),
            jobs,
            clock: Arc::new(SystemClock),
            event_tx,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn jobs(&self) -> &JobRepository {
        &self.jobs
    }

    pub fn dead_letters(&self) -> &DeadLetterRepository {
        &self.dlq
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        let _ = self.event_tx.send(event);
    }
}
