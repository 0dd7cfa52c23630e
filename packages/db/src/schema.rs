//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes. Safe to run from
/// every worker at startup.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;
    db.query(SETTINGS_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema. Timestamps are epoch milliseconds.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS command ON job TYPE string;
DEFINE FIELD IF NOT EXISTS state ON job TYPE string
    ASSERT $value INSIDE ["pending", "processing", "completed", "failed", "dead"];
DEFINE FIELD IF NOT EXISTS attempts ON job TYPE int DEFAULT 0 ASSERT $value >= 0;
DEFINE FIELD IF NOT EXISTS max_retries ON job TYPE int DEFAULT 3 ASSERT $value >= 0;
DEFINE FIELD IF NOT EXISTS created_at ON job TYPE int;
DEFINE FIELD IF NOT EXISTS updated_at ON job TYPE int;
DEFINE FIELD IF NOT EXISTS eligible_at ON job TYPE int;
DEFINE FIELD IF NOT EXISTS next_retry_at ON job TYPE option<int>;
DEFINE FIELD IF NOT EXISTS error_message ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS locked_by ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS locked_at ON job TYPE option<int>;

-- Listing by state, and the claim scan (eligible jobs, oldest first)
DEFINE INDEX IF NOT EXISTS job_state ON job FIELDS state;
DEFINE INDEX IF NOT EXISTS job_state_eligible ON job FIELDS state, eligible_at;
DEFINE INDEX IF NOT EXISTS job_locked_by ON job FIELDS locked_by;
DEFINE INDEX IF NOT EXISTS job_created ON job FIELDS created_at;
"#;

/// Queue-wide settings, a single record `settings:queue`.
const SETTINGS_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS settings SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS max_retries ON settings TYPE option<int>;
DEFINE FIELD IF NOT EXISTS backoff_base ON settings TYPE option<int>;
DEFINE FIELD IF NOT EXISTS lease_duration_secs ON settings TYPE option<int>;
DEFINE FIELD IF NOT EXISTS poll_interval_ms ON settings TYPE option<int>;
DEFINE FIELD IF NOT EXISTS updated_at ON settings TYPE option<int>;
"#;
