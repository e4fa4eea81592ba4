//! Integration tests for the deimos batch engine
//!
//! The subprocess scenarios drive real binaries (`true`, `false`, `sleep`,
//! `test`) and are therefore gated to Unix.

use deimos::{BatchEngine, RunConfig, RunError, TaskStatus};
use std::time::{Duration, Instant};

fn payloads(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("target-{}", i)).collect()
}

fn fast_retry_config(command: &[&str]) -> RunConfig {
    RunConfig::new(command.iter().map(|s| s.to_string()).collect())
        .with_base_delay(10)
        .with_max_delay(50)
}

#[cfg(unix)]
#[tokio::test]
async fn test_all_tasks_succeed() {
    let config = fast_retry_config(&["true"]).with_concurrency(2);
    let engine = BatchEngine::new(config).unwrap();

    let summary = engine.run(&payloads(5)).await.unwrap();

    assert_eq!(summary.total, 5);
    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.timed_out, 0);
    assert!(summary.is_clean());
    assert!(summary.per_task.iter().all(|o| o.exit_code == Some(0)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_persistent_failure_exhausts_attempts() {
    // `test <payload> = target-0` succeeds only for the first payload
    let config = fast_retry_config(&["test", "{payload}", "=", "target-0"])
        .with_concurrency(2)
        .with_max_attempts(3);
    let engine = BatchEngine::new(config).unwrap();

    let summary = engine.run(&payloads(3)).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(
        summary.succeeded + summary.failed + summary.timed_out,
        summary.total
    );

    let winner = &summary.per_task[0];
    assert_eq!(winner.status, TaskStatus::Success);
    assert_eq!(winner.attempts_used, 1);

    for loser in &summary.per_task[1..] {
        assert_eq!(loser.status, TaskStatus::Failure);
        assert_eq!(loser.attempts_used, 3);
        assert_eq!(loser.exit_code, Some(1));
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_never_returning_runner_times_out() {
    let config = fast_retry_config(&["sleep", "600"])
        .with_concurrency(1)
        .with_timeout(1_000)
        .with_max_attempts(1);
    let engine = BatchEngine::new(config).unwrap();

    let start = Instant::now();
    let summary = engine.run(&payloads(1)).await.unwrap();

    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.per_task[0].status, TaskStatus::TimedOut);
    // Runner must be killed within bounded extra delay, not run to completion
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[cfg(unix)]
#[tokio::test]
async fn test_timed_out_task_is_retried() {
    let config = fast_retry_config(&["sleep", "600"])
        .with_concurrency(1)
        .with_timeout(200)
        .with_max_attempts(2);
    let engine = BatchEngine::new(config).unwrap();

    let summary = engine.run(&payloads(1)).await.unwrap();

    assert_eq!(summary.per_task[0].status, TaskStatus::TimedOut);
    assert_eq!(summary.per_task[0].attempts_used, 2);
}

#[tokio::test]
async fn test_empty_input_rejected_before_any_worker() {
    let config = fast_retry_config(&["true"]);
    let engine = BatchEngine::new(config).unwrap();

    let result = engine.run(&[]).await;
    assert!(matches!(result, Err(RunError::ConfigError(_))));
}

#[tokio::test]
async fn test_missing_runner_binary_is_per_task_failure() {
    let config = fast_retry_config(&["/nonexistent/deimos-runner"])
        .with_concurrency(2)
        .with_max_attempts(2);
    let engine = BatchEngine::new(config).unwrap();

    // Launch errors must become outcomes, not crash the pool
    let summary = engine.run(&payloads(3)).await.unwrap();

    assert_eq!(summary.failed, 3);
    for outcome in &summary.per_task {
        assert_eq!(outcome.status, TaskStatus::Failure);
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.error.is_some());
        assert_eq!(outcome.attempts_used, 2);
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancellation_preserves_partial_results() {
    let config = fast_retry_config(&["sleep", "600"])
        .with_concurrency(2)
        .with_timeout(60_000)
        .with_max_attempts(1);
    let engine = BatchEngine::new(config).unwrap();
    let cancel = engine.cancellation_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
    });

    let start = Instant::now();
    let summary = engine.run(&payloads(6)).await.unwrap();

    // Cancellation must land well before any sleep finishes
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(summary.total, 6);

    // Only the in-flight tasks have outcomes, all of them fully formed
    assert!(summary.completed() <= summary.total);
    assert!(summary.cancelled >= 1);
    for outcome in &summary.per_task {
        assert_eq!(outcome.status, TaskStatus::Cancelled);
        assert!(outcome.attempts_used >= 1);
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_metacharacters_stay_inert() {
    // If the payload were shell-interpolated this would exit 0 via `true`
    let config = fast_retry_config(&["test", "-n", "{payload}"])
        .with_concurrency(1)
        .with_max_attempts(1);
    let engine = BatchEngine::new(config).unwrap();

    let hostile = vec!["x; exit 1".to_string()];
    let summary = engine.run(&hostile).await.unwrap();

    // `test -n "x; exit 1"` sees one non-empty argument and succeeds
    assert_eq!(summary.succeeded, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_large_input_bounded_by_concurrency() {
    let config = fast_retry_config(&["true"]).with_concurrency(4);
    let engine = BatchEngine::new(config).unwrap();

    let summary = engine.run(&payloads(100)).await.unwrap();

    assert_eq!(summary.total, 100);
    assert_eq!(summary.succeeded, 100);
    // Summary order matches input order regardless of completion order
    for (i, outcome) in summary.per_task.iter().enumerate() {
        assert_eq!(outcome.task_id, format!("task-{:04}", i + 1));
    }
}
