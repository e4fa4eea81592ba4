//! Bounded worker pool and run orchestration
//!
//! Admission is semaphore-gated: a permit is acquired in input order before
//! each task is spawned, so no more than `concurrency` runner invocations are
//! ever in flight, whatever the size of the input list. A retrying task gives
//! its slot back, sleeps the backoff off-slot, then queues for a fresh permit,
//! so backoff never idles a slot and retries never exceed the cap.

use crate::aggregate::Aggregator;
use crate::config::RunConfig;
use crate::executor::{CommandExecutor, Execute};
use crate::retry::RetryPolicy;
use crate::task::{Outcome, RunSummary, Task};
use crate::RunError;
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

/// Progress callback: (completed, total)
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Main batch execution engine
pub struct BatchEngine<E: Execute = CommandExecutor> {
    config: RunConfig,
    executor: Arc<E>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl BatchEngine<CommandExecutor> {
    /// Create an engine that runs the command configured in `config`
    pub fn new(config: RunConfig) -> crate::Result<Self> {
        config.validate()?;
        let executor = CommandExecutor::new(&config.command)?;
        Self::with_executor(config, executor)
    }
}

impl<E: Execute + 'static> BatchEngine<E> {
    /// Create an engine around a custom executor implementation
    pub fn with_executor(config: RunConfig, executor: E) -> crate::Result<Self> {
        if config.concurrency == 0 {
            return Err(RunError::ConfigError(
                "Concurrency must be greater than 0".to_string(),
            ));
        }
        if config.max_attempts == 0 {
            return Err(RunError::ConfigError(
                "Max attempts must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            policy: config.retry_policy(),
            executor: Arc::new(executor),
            config,
            cancel: CancellationToken::new(),
            progress: None,
        })
    }

    /// Install a progress callback, invoked periodically during the run
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Token that cancels the whole run: stops admissions and kills
    /// in-flight runners. Outcomes already recorded are preserved.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive every payload to a terminal outcome and return the summary.
    ///
    /// On cancellation the best-effort partial summary is returned instead
    /// of an error.
    pub async fn run(&self, payloads: &[String]) -> crate::Result<RunSummary> {
        if payloads.is_empty() {
            return Err(RunError::ConfigError(
                "Empty task list: nothing to run".to_string(),
            ));
        }

        let tasks = Task::from_payloads(payloads, self.config.timeout_duration());
        let total = tasks.len();

        info!(
            "Starting run: {} tasks, concurrency {}, max {} attempts",
            total, self.config.concurrency, self.policy.max_attempts
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let aggregator = Arc::new(Aggregator::new(total));

        let reporter = self.spawn_progress_reporter(aggregator.clone());

        let mut handles = Vec::new();

        for task in tasks {
            // Input-order admission; cancellation stops new dequeues
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Cancellation requested, stopping admissions");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => permit.unwrap(),
            };

            let executor = self.executor.clone();
            let aggregator = aggregator.clone();
            let policy = self.policy.clone();
            let cancel = self.cancel.clone();
            let slots = semaphore.clone();

            let handle = tokio::spawn(async move {
                drive_task(task, permit, executor, slots, policy, aggregator, cancel).await;
            });

            handles.push(handle);
        }

        // Wait for all admitted tasks to reach a terminal outcome
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                log::error!("Worker task panicked: {}", e);
            }
        }

        if let Some((stop, handle)) = reporter {
            stop.cancel();
            let _ = handle.await;
        }
        if let Some(callback) = &self.progress {
            let (completed, total) = aggregator.progress().await;
            callback(completed, total);
        }

        let summary = aggregator.snapshot().await;

        info!(
            "Run finished in {:?}: {} succeeded, {} failed, {} timed out, {} cancelled",
            summary.duration,
            summary.succeeded,
            summary.failed,
            summary.timed_out,
            summary.cancelled
        );

        Ok(summary)
    }

    fn spawn_progress_reporter(
        &self,
        aggregator: Arc<Aggregator>,
    ) -> Option<(CancellationToken, tokio::task::JoinHandle<()>)> {
        let callback = self.progress.as_ref()?.clone();
        let stop = CancellationToken::new();
        let stop_child = stop.clone();

        let handle = tokio::spawn(async move {
            loop {
                let (completed, total) = aggregator.progress().await;
                callback(completed, total);

                if completed == total {
                    break;
                }

                tokio::select! {
                    _ = stop_child.cancelled() => break,
                    _ = sleep(Duration::from_millis(100)) => {}
                }
            }
        });

        Some((stop, handle))
    }
}

/// Run one task through attempts until a terminal outcome is recorded.
///
/// Holds an execution slot only while the executor runs. Exactly one outcome
/// is recorded per invocation, on every path.
async fn drive_task<E: Execute + ?Sized>(
    mut task: Task,
    first_permit: OwnedSemaphorePermit,
    executor: Arc<E>,
    slots: Arc<Semaphore>,
    policy: RetryPolicy,
    aggregator: Arc<Aggregator>,
    cancel: CancellationToken,
) {
    let mut permit = Some(first_permit);
    // Last failed outcome, recorded as terminal if cancellation lands while
    // this task is queued for a retry slot
    let mut pending: Option<Outcome> = None;

    loop {
        let slot = match permit.take() {
            Some(p) => p,
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if let Some(outcome) = pending.take() {
                            aggregator.record(&task, outcome).await;
                        }
                        return;
                    }
                    acquired = slots.clone().acquire_owned() => acquired.unwrap(),
                }
            }
        };

        let outcome = executor.execute(&task, &cancel).await;
        drop(slot);

        if cancel.is_cancelled() || !policy.should_retry(outcome.status, task.attempt) {
            aggregator.record(&task, outcome).await;
            return;
        }

        let delay = policy.backoff(task.attempt);
        debug!(
            "{} attempt {} ended with {}, retrying in {:?}",
            task.id,
            task.attempt + 1,
            outcome.status.as_str(),
            delay
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                aggregator.record(&task, outcome).await;
                return;
            }
            _ = sleep(delay) => {}
        }

        pending = Some(outcome);
        task.attempt += 1;
    }
}
