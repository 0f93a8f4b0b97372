// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base: Duration::from_secs(2),
        cap: Duration::from_secs(10),
        jitter: Duration::ZERO,
    }
}

#[test]
fn backoff_doubles_until_cap() {
    let policy = policy();
    assert_eq!(policy.delay(1), Duration::from_secs(2));
    assert_eq!(policy.delay(2), Duration::from_secs(4));
    assert_eq!(policy.delay(3), Duration::from_secs(8));
    assert_eq!(policy.delay(4), Duration::from_secs(10));
    assert_eq!(policy.delay(10), Duration::from_secs(10));
}

#[test]
fn jitter_stays_under_bound() {
    let policy = RetryPolicy {
        jitter: Duration::from_millis(100),
        ..policy()
    };
    for attempt in 1..=5 {
        let delay = policy.delay(attempt);
        let backoff = RetryPolicy { jitter: Duration::ZERO, ..policy }.delay(attempt);
        assert!(delay >= backoff);
        assert!(delay < backoff + Duration::from_millis(100));
    }
}

#[test]
fn should_retry_up_to_max() {
    let policy = policy();
    assert!(policy.should_retry(1));
    assert!(policy.should_retry(2));
    assert!(!policy.should_retry(3));
}

#[test]
fn immediate_policy_has_no_delay() {
    let policy = RetryPolicy::immediate(5);
    assert_eq!(policy.delay(3), Duration::ZERO);
    assert!(policy.should_retry(4));
    assert!(!policy.should_retry(5));
}
