//! Repository pattern implementations for database operations.

mod dlq_repo;
mod job_repo;
mod settings_repo;

pub use dlq_repo::DeadLetterRepository;
pub use job_repo::{JobFilter, JobRepository};
pub use settings_repo::SettingsRepository;
