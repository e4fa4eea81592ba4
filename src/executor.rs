//! Runner execution with process isolation and timeout enforcement
//!
//! The external runner is invoked as an argument vector, never through a
//! shell: the payload is substituted into (or appended as) a discrete
//! argument, so payload content can never change the command structure.

use crate::task::{Outcome, Task, TaskStatus};
use crate::{Result, RunError};
use async_trait::async_trait;
use log::{debug, warn};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as AsyncCommand;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Placeholder token replaced by the task payload in command arguments
pub const PAYLOAD_TOKEN: &str = "{payload}";

/// Stderr capture cap per invocation
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Execution seam between the pool and the external runner.
///
/// The production implementation spawns a subprocess; tests substitute
/// instrumented implementations to observe scheduling behavior.
#[async_trait]
pub trait Execute: Send + Sync {
    /// Run one attempt of `task` to a fully formed outcome.
    ///
    /// Must not leave any spawned process running after returning, and must
    /// never panic across the pool boundary: launch failures become
    /// `Failure` outcomes with an error field.
    async fn execute(&self, task: &Task, cancel: &CancellationToken) -> Outcome;
}

/// Executes the configured runner command once per task
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    /// Create an executor from a command template (program + arguments)
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| RunError::ConfigError("Empty runner command".to_string()))?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Substitute the payload into the argument template.
    ///
    /// Each occurrence of `{payload}` is replaced within its argument; if no
    /// argument carries the token, the payload is appended as the final
    /// argument. Either way the payload stays a single argv element.
    fn build_args(&self, task: &Task) -> Vec<String> {
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(PAYLOAD_TOKEN) {
                    substituted = true;
                    arg.replace(PAYLOAD_TOKEN, &task.payload)
                } else {
                    arg.clone()
                }
            })
            .collect();

        if !substituted {
            args.push(task.payload.clone());
        }

        args
    }

    fn build_command(&self, task: &Task) -> AsyncCommand {
        let mut command = AsyncCommand::new(&self.program);
        command.args(self.build_args(task));

        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        command
    }

    /// Read stderr up to the capture cap so the pipe never blocks the child
    async fn read_stderr<R>(mut reader: BufReader<R>) -> String
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut output = String::new();
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    if output.len() + line.len() > MAX_STDERR_BYTES {
                        output.push_str("\n[OUTPUT TRUNCATED - SIZE LIMIT EXCEEDED]\n");
                        // Keep draining so the child is not blocked on a full pipe
                        let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                        break;
                    }
                    output.push_str(&line);
                }
                Err(e) => {
                    warn!("Failed to read runner stderr: {}", e);
                    break;
                }
            }
        }

        output
    }
}

enum WaitResult {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl Execute for CommandExecutor {
    async fn execute(&self, task: &Task, cancel: &CancellationToken) -> Outcome {
        let start_time = Instant::now();

        if cancel.is_cancelled() {
            return Outcome::new(task, TaskStatus::Cancelled).with_duration(start_time.elapsed());
        }

        debug!(
            "Executing {} for {} (attempt {})",
            self.program,
            task.payload,
            task.attempt + 1
        );

        let mut command = self.build_command(task);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn runner for {}: {}", task.id, e);
                return Outcome::new(task, TaskStatus::Failure)
                    .with_duration(start_time.elapsed())
                    .with_error(format!("Failed to spawn runner: {}", e));
            }
        };

        // Drain stderr concurrently; a full pipe would stall the child
        let stderr_handle = child.stderr.take().map(|stderr| {
            tokio::spawn(Self::read_stderr(BufReader::new(stderr)))
        });

        let waited = tokio::select! {
            status = child.wait() => WaitResult::Exited(status),
            _ = sleep(task.timeout) => WaitResult::TimedOut,
            _ = cancel.cancelled() => WaitResult::Cancelled,
        };

        let outcome = match waited {
            WaitResult::Exited(Ok(status)) => {
                let exit_code = status.code();
                if status.success() {
                    Outcome::new(task, TaskStatus::Success).with_exit_code(exit_code)
                } else {
                    let mut outcome =
                        Outcome::new(task, TaskStatus::Failure).with_exit_code(exit_code);
                    if let Some(handle) = stderr_handle {
                        if let Ok(stderr) = handle.await {
                            let stderr = stderr.trim();
                            if !stderr.is_empty() {
                                outcome = outcome.with_error(stderr.to_string());
                            }
                        }
                    }
                    return outcome.with_duration(start_time.elapsed());
                }
            }
            WaitResult::Exited(Err(e)) => {
                let _ = child.kill().await;
                Outcome::new(task, TaskStatus::Failure)
                    .with_error(format!("Failed to wait for runner: {}", e))
            }
            WaitResult::TimedOut => {
                warn!(
                    "Runner for {} timed out after {:?}, killing",
                    task.id, task.timeout
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out runner for {}: {}", task.id, e);
                }
                Outcome::new(task, TaskStatus::TimedOut)
            }
            WaitResult::Cancelled => {
                debug!("Run cancelled, killing runner for {}", task.id);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill cancelled runner for {}: {}", task.id, e);
                }
                Outcome::new(task, TaskStatus::Cancelled)
            }
        };

        // The reader task ends once the child is reaped and the pipe closes
        if let Some(handle) = stderr_handle {
            let _ = handle.await;
        }

        outcome.with_duration(start_time.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn task_with_payload(payload: &str) -> Task {
        Task::new(0, payload.to_string(), Duration::from_secs(5))
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandExecutor::new(&[]).is_err());
    }

    #[test]
    fn test_payload_substituted_in_place() {
        let command = vec![
            "scanner".to_string(),
            "--target={payload}".to_string(),
            "--verbose".to_string(),
        ];
        let executor = CommandExecutor::new(&command).unwrap();

        let args = executor.build_args(&task_with_payload("example.onion"));
        assert_eq!(args, vec!["--target=example.onion", "--verbose"]);
    }

    #[test]
    fn test_payload_appended_without_token() {
        let command = vec!["scanner".to_string(), "--verbose".to_string()];
        let executor = CommandExecutor::new(&command).unwrap();

        let args = executor.build_args(&task_with_payload("example.onion"));
        assert_eq!(args, vec!["--verbose", "example.onion"]);
    }

    #[test]
    fn test_payload_stays_single_argument() {
        // Shell metacharacters in the payload must not split the argv
        let command = vec!["scanner".to_string(), "{payload}".to_string()];
        let executor = CommandExecutor::new(&command).unwrap();

        let args = executor.build_args(&task_with_payload("a.onion; rm -rf /"));
        assert_eq!(args, vec!["a.onion; rm -rf /"]);
    }

    #[tokio::test]
    async fn test_missing_binary_becomes_failure_outcome() {
        let command = vec!["/nonexistent/deimos-test-runner".to_string()];
        let executor = CommandExecutor::new(&command).unwrap();
        let cancel = CancellationToken::new();

        let outcome = executor
            .execute(&task_with_payload("target"), &cancel)
            .await;

        assert_eq!(outcome.status, TaskStatus::Failure);
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.error.as_deref().unwrap().contains("spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes_mapped() {
        let cancel = CancellationToken::new();

        let executor = CommandExecutor::new(&["true".to_string()]).unwrap();
        let outcome = executor.execute(&task_with_payload("x"), &cancel).await;
        assert_eq!(outcome.status, TaskStatus::Success);
        assert_eq!(outcome.exit_code, Some(0));

        let executor = CommandExecutor::new(&["false".to_string()]).unwrap();
        let outcome = executor.execute(&task_with_payload("x"), &cancel).await;
        assert_eq!(outcome.status, TaskStatus::Failure);
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_runner() {
        let executor =
            CommandExecutor::new(&["sleep".to_string(), "30".to_string()]).unwrap();
        let cancel = CancellationToken::new();
        let mut task = task_with_payload("x");
        task.timeout = Duration::from_millis(200);

        let start = Instant::now();
        let outcome = executor.execute(&task, &cancel).await;

        assert_eq!(outcome.status, TaskStatus::TimedOut);
        // Kill must happen promptly, not after the sleep finishes
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
