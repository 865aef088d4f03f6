//! Integration tests for sliding-window admission and server rate limits

use std::time::Duration;
use tokio::time::Instant;

use match_harvester::harvester::{
    BudgetTracker, EndpointClass, ErrorClass, RetryDecision, RetryPolicy, WindowSpec,
};

/// Deterministic xorshift sequence of request gaps, 0-299 ms
fn gaps(seed: u64, count: usize) -> Vec<Duration> {
    let mut state = seed;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            Duration::from_millis(state % 300)
        })
        .collect()
}

fn assert_window_respected(admitted: &[Instant], spec: WindowSpec) {
    for (i, start) in admitted.iter().enumerate() {
        let within = admitted[i..]
            .iter()
            .take_while(|t| t.duration_since(*start) < spec.duration)
            .count();
        assert!(
            within <= spec.capacity,
            "{within} admissions within {:?} (capacity {})",
            spec.duration,
            spec.capacity
        );
    }
}

#[test]
fn test_no_window_ever_exceeds_capacity() {
    let short = WindowSpec::new(5, Duration::from_secs(1));
    let long = WindowSpec::new(12, Duration::from_secs(10));

    for seed in [1u64, 7, 42, 1234, 99_991] {
        let mut budget = BudgetTracker::new(&[short, long]).unwrap();
        let base = Instant::now();
        let mut now = base;
        let mut admitted = Vec::new();

        for gap in gaps(seed, 400) {
            now += gap;
            if budget.admit_at(EndpointClass::Match, now).is_zero() {
                admitted.push(now);
            }
        }

        assert!(!admitted.is_empty());
        assert_window_respected(&admitted, short);
        assert_window_respected(&admitted, long);
    }
}

#[test]
fn test_waiting_the_returned_delay_is_enough() {
    let spec = WindowSpec::new(3, Duration::from_secs(2));
    let mut budget = BudgetTracker::new(&[spec]).unwrap();
    let mut now = Instant::now();
    let mut admitted = Vec::new();

    for _ in 0..20 {
        let wait = budget.admit_at(EndpointClass::Default, now);
        if wait.is_zero() {
            admitted.push(now);
        } else {
            now += wait;
            assert!(budget.admit_at(EndpointClass::Default, now).is_zero());
            admitted.push(now);
        }
    }

    assert_eq!(admitted.len(), 20);
    assert_window_respected(&admitted, spec);
}

#[test]
fn test_endpoint_classes_have_independent_budgets() {
    let mut budget = BudgetTracker::new(&[WindowSpec::new(1, Duration::from_secs(60))]).unwrap();
    let now = Instant::now();

    assert!(budget.admit_at(EndpointClass::League, now).is_zero());
    assert!(!budget.admit_at(EndpointClass::League, now).is_zero());
    assert!(budget.admit_at(EndpointClass::Match, now).is_zero());
}

#[test]
fn test_server_hint_is_returned_and_blocks_the_class() {
    let mut budget = BudgetTracker::for_keys(1).with_max_hint(Duration::from_secs(120));
    let now = Instant::now();

    let hint = budget.on_rate_limit_response_at(
        EndpointClass::Match,
        Some(Duration::from_secs(7)),
        now,
    );
    assert_eq!(hint, Some(Duration::from_secs(7)));
    assert_eq!(
        budget.admit_at(EndpointClass::Match, now + Duration::from_secs(2)),
        Duration::from_secs(5)
    );
    assert!(budget
        .admit_at(EndpointClass::Match, now + Duration::from_secs(7))
        .is_zero());

    // Oversized hints are clamped
    let hint = budget.on_rate_limit_response_at(
        EndpointClass::League,
        Some(Duration::from_secs(3600)),
        now,
    );
    assert_eq!(hint, Some(Duration::from_secs(120)));
}

#[test]
fn test_missing_hint_falls_back_to_deterministic_backoff() {
    let mut budget = BudgetTracker::for_keys(1);
    let hint = budget.on_rate_limit_response(EndpointClass::Match, None);
    assert_eq!(hint, None);

    let policy = RetryPolicy::default();
    let delays: Vec<_> = (1..=4)
        .map(|n| policy.next_action(ErrorClass::RateLimited, n, None))
        .collect();
    assert_eq!(
        delays,
        vec![
            RetryDecision::Retry(Duration::from_secs(1)),
            RetryDecision::Retry(Duration::from_secs(2)),
            RetryDecision::Retry(Duration::from_secs(4)),
            RetryDecision::Retry(Duration::from_secs(8)),
        ]
    );
    // Same attempt number, same delay
    assert_eq!(
        policy.next_action(ErrorClass::RateLimited, 3, None),
        RetryDecision::Retry(Duration::from_secs(4))
    );
}
