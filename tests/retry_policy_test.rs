use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tradestat_harvester::{HarvestError, RetryPolicy};

fn quick(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        exponential_base: 2.0,
        jitter: true,
    }
}

#[tokio::test]
async fn always_failing_op_runs_max_retries_plus_one_times() {
    let calls = AtomicU32::new(0);
    let policy = quick(3);

    let err = policy
        .run("always fails", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(HarvestError::transient(format!("attempt {attempt}"))) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(err.to_string(), "Transient failure: attempt 3", "last error is surfaced");
}

#[tokio::test]
async fn non_retryable_error_is_returned_at_once() {
    let calls = AtomicU32::new(0);

    let err = quick(5)
        .run("schema", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(HarvestError::schema("missing data_by_year")) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, HarvestError::SchemaInvalid(_)));
}

#[tokio::test]
async fn pool_exhaustion_is_not_retried() {
    let calls = AtomicU32::new(0);

    let err = quick(5)
        .run("acquire", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(HarvestError::PoolExhausted {
                    timeout: Duration::from_secs(1),
                })
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, HarvestError::PoolExhausted { .. }));
}

#[tokio::test]
async fn recovers_after_transient_failures() {
    let value = quick(3)
        .run("flaky", |attempt| async move {
            if attempt < 2 {
                Err(HarvestError::RateLimited {
                    retry_after: Duration::from_millis(1),
                })
            } else {
                Ok(attempt)
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 2);
}

#[tokio::test(start_paused = true)]
async fn backoff_sleeps_follow_the_schedule() {
    let policy = RetryPolicy::scraping().without_jitter();
    let started = tokio::time::Instant::now();

    let _ = policy
        .run("paused", |_| async { Err::<(), _>(HarvestError::transient("down")) })
        .await;

    // 2s + 4s + 8s between the four attempts
    assert_eq!(started.elapsed(), Duration::from_secs(14));
}
