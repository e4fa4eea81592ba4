//! Thread-safe aggregation of terminal outcomes
//!
//! Workers record outcomes in completion order; snapshots rebuild the
//! summary in input order by task index, so the report is stable no matter
//! how the pool scheduled the work.

use crate::task::{Outcome, RunSummary, Task, TaskStatus};
use log::warn;
use std::time::Instant;
use tokio::sync::Mutex;

/// Collects exactly one terminal outcome per task
pub struct Aggregator {
    inner: Mutex<AggregateState>,
}

struct AggregateState {
    slots: Vec<Option<Outcome>>,
    completed: usize,
    start_time: Instant,
}

impl Aggregator {
    pub fn new(total: usize) -> Self {
        Self {
            inner: Mutex::new(AggregateState {
                slots: vec![None; total],
                completed: 0,
                start_time: Instant::now(),
            }),
        }
    }

    /// Record the terminal outcome for a task. Called once per task from any
    /// worker; a second record for the same slot is dropped.
    pub async fn record(&self, task: &Task, outcome: Outcome) {
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;

        match state.slots.get_mut(task.index) {
            Some(slot @ None) => {
                *slot = Some(outcome);
                state.completed += 1;
            }
            Some(Some(_)) => {
                warn!("Duplicate outcome for {} dropped", task.id);
            }
            None => {
                warn!("Outcome for unknown task index {} dropped", task.index);
            }
        }
    }

    /// Consistent view of the run so far, usable mid-run for progress
    /// reporting and at completion for the final report.
    pub async fn snapshot(&self) -> RunSummary {
        let state = self.inner.lock().await;

        let mut summary = RunSummary {
            total: state.slots.len(),
            succeeded: 0,
            failed: 0,
            timed_out: 0,
            cancelled: 0,
            duration: state.start_time.elapsed(),
            per_task: Vec::with_capacity(state.completed),
        };

        for outcome in state.slots.iter().flatten() {
            match outcome.status {
                TaskStatus::Success => summary.succeeded += 1,
                TaskStatus::Failure => summary.failed += 1,
                TaskStatus::TimedOut => summary.timed_out += 1,
                TaskStatus::Cancelled => summary.cancelled += 1,
            }
            summary.per_task.push(outcome.clone());
        }

        summary
    }

    /// (completed, total) counters for progress display
    pub async fn progress(&self) -> (usize, usize) {
        let state = self.inner.lock().await;
        (state.completed, state.slots.len())
    }
}
