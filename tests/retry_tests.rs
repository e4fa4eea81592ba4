//! Property tests for the retry policy

use deimos::{RetryPolicy, TaskStatus};
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #[test]
    fn backoff_is_monotonically_non_decreasing(
        base_ms in 1u64..5_000,
        max_ms in 1u64..120_000,
        attempt in 0u32..63,
    ) {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        };

        prop_assert!(policy.backoff(attempt) <= policy.backoff(attempt + 1));
    }

    #[test]
    fn backoff_never_exceeds_max_delay(
        base_ms in 1u64..5_000,
        max_ms in 1u64..120_000,
        attempt in 0u32..1_000,
    ) {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        };

        prop_assert!(policy.backoff(attempt) <= policy.max_delay);
    }

    #[test]
    fn first_backoff_is_base_delay(base_ms in 1u64..5_000) {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_secs(3_600),
        };

        prop_assert_eq!(policy.backoff(0), Duration::from_millis(base_ms));
    }

    #[test]
    fn attempts_never_exceed_budget(max_attempts in 1u32..20, attempt in 0u32..40) {
        let policy = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        };

        // If a retry is allowed, the next attempt still fits the budget
        if policy.should_retry(TaskStatus::Failure, attempt) {
            prop_assert!(attempt + 1 < max_attempts);
        }
    }

    #[test]
    fn success_and_cancelled_are_always_terminal(attempt in 0u32..40) {
        let policy = RetryPolicy::default();

        prop_assert!(!policy.should_retry(TaskStatus::Success, attempt));
        prop_assert!(!policy.should_retry(TaskStatus::Cancelled, attempt));
    }
}
