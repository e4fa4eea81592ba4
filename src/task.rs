//! Task and outcome data model for batch runs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One unit of work: a single invocation of the external runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Identifier unique within a run
    pub id: String,

    /// Opaque payload handed to the runner (e.g. a target address)
    pub payload: String,

    /// Position in the input list, orders the final summary
    pub index: usize,

    /// Zero-based attempt counter, incremented on each retry
    pub attempt: u32,

    /// Per-task execution timeout
    pub timeout: Duration,
}

impl Task {
    pub fn new(index: usize, payload: String, timeout: Duration) -> Self {
        Self {
            id: format!("task-{:04}", index + 1),
            payload,
            index,
            attempt: 0,
            timeout,
        }
    }

    /// Build tasks from an ordered payload list
    pub fn from_payloads(payloads: &[String], timeout: Duration) -> Vec<Task> {
        payloads
            .iter()
            .enumerate()
            .map(|(index, payload)| Task::new(index, payload.clone(), timeout))
            .collect()
    }
}

/// Terminal state of a task after all retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Success,
    Failure,
    TimedOut,
    Cancelled,
}

impl TaskStatus {
    /// Whether a retry may follow this status
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskStatus::Failure | TaskStatus::TimedOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::Failure => "failure",
            TaskStatus::TimedOut => "timed_out",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Terminal result of a single task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Task this outcome belongs to
    pub task_id: String,

    /// Attempts consumed, including the final one
    pub attempts_used: u32,

    /// Terminal status of the last attempt
    pub status: TaskStatus,

    /// Exit code of the runner process, if it ran to completion
    pub exit_code: Option<i32>,

    /// Measured wall time of the last attempt
    pub duration: Duration,

    /// Launch or wait error text, distinguishes "could not start" from
    /// "ran and exited nonzero"
    pub error: Option<String>,
}

impl Outcome {
    pub fn new(task: &Task, status: TaskStatus) -> Self {
        Self {
            task_id: task.id.clone(),
            attempts_used: task.attempt + 1,
            status,
            exit_code: None,
            duration: Duration::from_secs(0),
            error: None,
        }
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_error<S: Into<String>>(mut self, error: S) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// Aggregated result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of tasks constructed from the input list
    pub total: usize,

    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,

    /// Total run duration so far
    pub duration: Duration,

    /// Terminal outcomes in input order; shorter than `total` only when the
    /// run was cancelled or the snapshot was taken mid-run
    pub per_task: Vec<Outcome>,
}

impl RunSummary {
    /// Whether every task finished and none failed
    pub fn is_clean(&self) -> bool {
        self.succeeded == self.total
            && self.failed == 0
            && self.timed_out == 0
            && self.cancelled == 0
    }

    /// Number of tasks with a recorded terminal outcome
    pub fn completed(&self) -> usize {
        self.per_task.len()
    }

    /// Fraction of completed tasks that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.per_task.is_empty() {
            0.0
        } else {
            self.succeeded as f64 / self.per_task.len() as f64
        }
    }

    /// Tasks completed per second over the run so far
    pub fn run_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.per_task.len() as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}
