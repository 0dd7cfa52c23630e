//! SurrealDB integration for the queuectl job queue.
//!
//! This crate provides the shared job store: the persistent job table, the
//! conditional-write claim protocol, the dead letter queue and the
//! queue-wide settings.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage
//! - `remote`: Connect to a SurrealDB server over WebSocket, so that worker
//!   processes on one host share one store

mod connection;
mod record;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use schema::init_schema;

/// Connect to the database and make sure the schema exists.
///
/// Every producer and worker process calls this once at startup.
pub async fn init(config: &DbConfig) -> Result<Database, DbError> {
    let db = connect(config).await?;
    init_schema(&db).await?;
    Ok(db)
}
