/*!
 * Tests for retry scheduling and the bounded worker pool
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sublingo::errors::{ProviderError, TranslationError};
use sublingo::translation::scheduler::{JobSlot, RetryPolicy, retry_with_backoff, run_indexed_pool};

use crate::common::mock_providers::MockErrorType;

/// Rate limits and server errors are retried until the attempts run out
#[tokio::test]
async fn test_retry_with_backoff_withPersistentRateLimit_shouldUseEveryAttempt() {
    let policy = RetryPolicy::new(4, 1);
    let cancel = CancellationToken::new();
    let calls = AtomicUsize::new(0);
    let counter = &calls;

    let result: Result<(), ProviderError> = retry_with_backoff(&policy, &cancel, "rate limited", || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(MockErrorType::RateLimit.error())
    })
    .await;

    assert!(matches!(result, Err(ProviderError::RateLimitExceeded(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

/// A server error followed by success returns the value
#[tokio::test]
async fn test_retry_with_backoff_withServerErrorThenSuccess_shouldReturnValue() {
    let policy = RetryPolicy::new(3, 1);
    let cancel = CancellationToken::new();
    let calls = AtomicUsize::new(0);
    let counter = &calls;

    let result = retry_with_backoff(&policy, &cancel, "flaky", || async move {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(MockErrorType::Api.error())
        } else {
            Ok("done")
        }
    })
    .await;

    assert_eq!(result.ok(), Some("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Cancelling during the backoff sleep aborts without another attempt
#[tokio::test]
async fn test_retry_with_backoff_withCancelDuringBackoff_shouldAbort() {
    let policy = RetryPolicy::new(5, 10_000);
    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let counter = calls.clone();
    let result: Result<(), ProviderError> = retry_with_backoff(&policy, &cancel, "slow", || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(MockErrorType::Connection.error())
        }
    })
    .await;

    assert!(matches!(result, Err(ProviderError::Aborted)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// The pool never runs more tasks at once than its size
#[tokio::test]
async fn test_run_indexed_pool_withSlowTasks_shouldRespectBound() {
    let cancel = CancellationToken::new();
    let in_flight = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let (in_flight, peak) = (&in_flight, &peak);

    let items: Vec<usize> = (0..12).collect();
    let mut seen = Vec::new();
    let results = run_indexed_pool(
        items,
        3,
        &cancel,
        |index, item| async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            // Later items finish first so completion order differs from input order
            tokio::time::sleep(Duration::from_millis(2 + (12 - index as u64))).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, TranslationError>(item * 10)
        },
        |index, _| seen.push(index),
    )
    .await;

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(seen.len(), 12);
    let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, (0..12).map(|i| i * 10).collect::<Vec<_>>());
}

/// Failures stay in their own slot and do not stop the other items
#[tokio::test]
async fn test_run_indexed_pool_withOneFailure_shouldKeepOtherResults() {
    let cancel = CancellationToken::new();
    let results = run_indexed_pool(
        vec!["a", "b", "c"],
        2,
        &cancel,
        |_, item| async move {
            if item == "b" {
                Err(TranslationError::Content("bad".into()))
            } else {
                Ok(item.to_uppercase())
            }
        },
        |_, _| {},
    )
    .await;

    assert_eq!(results[0].as_deref().ok(), Some("A"));
    assert!(matches!(results[1], Err(TranslationError::Content(_))));
    assert_eq!(results[2].as_deref().ok(), Some("C"));
}

/// Slots of different kinds are independent and reusable after release
#[test]
fn test_job_slot_withTwoKinds_shouldNotBlockEachOther() {
    let translation = JobSlot::new("translation");
    let summary = JobSlot::new("summary");

    let first = translation.try_start();
    assert!(first.is_some());
    assert!(translation.try_start().is_none());
    assert!(summary.try_start().is_some());
    assert!(translation.is_running());

    let shared = translation.clone();
    drop(first);
    assert!(!shared.is_running());
    assert!(shared.try_start().is_some());
    assert_eq!(shared.name(), "translation");
}
