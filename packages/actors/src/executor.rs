//! Command executors: the code that actually runs a job's command.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use queuectl_core::ExecOutcome;
use tokio::process::Command;

/// Future type for async executors.
pub type ExecFuture = Pin<Box<dyn Future<Output = ExecOutcome> + Send>>;

/// Trait for running a job's command.
///
/// An executor never fails as such: anything that goes wrong while running
/// the command is reported as [`ExecOutcome::Failure`] and recorded on the job.
pub trait CommandExecutor: Send + Sync + 'static {
    fn execute(&self, command: &str) -> ExecFuture;
}

/// Runs the command through `sh -c`.
///
/// Exit status 0 is success. Otherwise the failure message is
/// `Exit code N` followed by the trimmed stderr, if any.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    timeout: Option<Duration>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the command and report a failure if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, command: &str) -> ExecFuture {
        let command = command.to_string();
        let timeout = self.timeout;

        Box::pin(async move {
            let output = Command::new("sh")
                .arg("-c")
                .arg(&command)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output();

            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, output).await {
                    Ok(result) => result,
                    Err(_) => {
                        return ExecOutcome::failure(format!(
                            "Command timed out after {}s",
                            limit.as_secs()
                        ));
                    }
                },
                None => output.await,
            };

            match result {
                Ok(output) if output.status.success() => ExecOutcome::Success,
                Ok(output) => {
                    let mut message = match output.status.code() {
                        Some(code) => format!("Exit code {}", code),
                        None => "Terminated by signal".to_string(),
                    };
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let stderr = stderr.trim();
                    if !stderr.is_empty() {
                        message.push_str(": ");
                        message.push_str(stderr);
                    }
                    ExecOutcome::Failure(message)
                }
                Err(e) => ExecOutcome::failure(format!("Failed to start command: {}", e)),
            }
        })
    }
}

/// A simple function-based executor.
pub struct FnExecutor<F>
where
    F: Fn(&str) -> ExecFuture + Send + Sync + 'static,
{
    executor: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&str) -> ExecFuture + Send + Sync + 'static,
{
    /// Create a new function-based executor.
    pub fn new(executor: F) -> Self {
        Self { executor }
    }
}

impl<F> CommandExecutor for FnExecutor<F>
where
    F: Fn(&str) -> ExecFuture + Send + Sync + 'static,
{
    fn execute(&self, command: &str) -> ExecFuture {
        (self.executor)(command)
    }
}

/// Helper macro for creating executors from async closures.
#[macro_export]
macro_rules! command_executor {
    (|$command:ident| $body:expr) => {
        $crate::FnExecutor::new(|$command: &str| {
            let $command = $command.to_string();
            Box::pin(async move { $body })
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_success() {
        let outcome = ShellExecutor::new().execute("exit 0").await;
        assert_eq!(outcome, ExecOutcome::Success);
    }

    #[tokio::test]
    async fn test_shell_failure_carries_exit_code_and_stderr() {
        let outcome = ShellExecutor::new()
            .execute("echo nope >&2; exit 3")
            .await;
        assert_eq!(outcome, ExecOutcome::failure("Exit code 3: nope"));
    }

    #[tokio::test]
    async fn test_shell_timeout() {
        let outcome = ShellExecutor::new()
            .with_timeout(Duration::from_millis(50))
            .execute("sleep 5")
            .await;
        assert!(matches!(outcome, ExecOutcome::Failure(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn test_fn_executor() {
        let executor = command_executor!(|command| {
            if command == "ok" {
                ExecOutcome::Success
            } else {
                ExecOutcome::failure(command)
            }
        });
        assert_eq!(executor.execute("ok").await, ExecOutcome::Success);
        assert_eq!(executor.execute("bad").await, ExecOutcome::failure("bad"));
    }
}
