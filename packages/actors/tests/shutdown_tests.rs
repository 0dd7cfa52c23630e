mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use actors::{CommandExecutor, ShellExecutor, WorkerPool, install_shutdown_handler};

// Kept in its own test binary: once installed, the handler owns SIGTERM for the process.
#[tokio::test]
async fn test_sigterm_stops_the_pool() -> Result<(), Box<dyn Error>> {
    let jobs = common::setup_jobs().await?;
    let cancel = install_shutdown_handler()?;

    let executor: Arc<dyn CommandExecutor> = Arc::new(ShellExecutor::new());
    let pool = WorkerPool::builder(jobs, executor, common::fast_config())
        .count(2)
        .cancel_token(cancel.clone())
        .start()
        .await?;

    let status = std::process::Command::new("kill")
        .arg("-TERM")
        .arg(std::process::id().to_string())
        .status()?;
    assert!(status.success());

    tokio::time::timeout(Duration::from_secs(5), cancel.cancelled()).await?;
    tokio::time::timeout(Duration::from_secs(5), pool.wait()).await??;
    Ok(())
}
