//! Integration tests driving the full resilience stack through the invoker.

use super::*;
use crate::clock::MockClock;
use crate::config::ResilienceConfig;
use crate::errors::{CallError, ErrorKind, InvocationError};
use crate::observability::{metric_names, InMemoryMetricsCollector};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        multiplier: 2.0,
        jitter_fraction: 0.0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_resilience_stack_success() {
    let invoker = ResilientInvoker::builder()
        .target("payments")
        .build()
        .expect("valid config");

    let result = invoker
        .execute(
            "payments",
            Operation::new("charge", || async { Ok::<_, CallError>("success") }),
        )
        .await;

    assert_eq!(assert_ok!(result), "success");
}

#[tokio::test]
async fn test_retry_with_eventual_success() {
    let invoker = ResilientInvoker::builder()
        .defaults(ResilienceConfig {
            retry: fast_retry(5),
            ..Default::default()
        })
        .target("payments")
        .build()
        .expect("valid config");

    let calls = Arc::new(AtomicU32::new(0));
    let calls_in_op = Arc::clone(&calls);

    let result = invoker
        .execute(
            "payments",
            Operation::new("charge", move || {
                let calls = Arc::clone(&calls_in_op);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CallError::service(503, "unavailable"))
                    } else {
                        Ok("recovered")
                    }
                }
            }),
        )
        .await;

    assert_eq!(assert_ok!(result), "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retries_exhausted_reports_attempts_and_last_error() {
    let invoker = ResilientInvoker::builder()
        .defaults(ResilienceConfig {
            retry: fast_retry(3),
            ..Default::default()
        })
        .target("payments")
        .build()
        .expect("valid config");

    let result: Result<(), _> = invoker
        .execute(
            "payments",
            Operation::new("charge", || async {
                Err(CallError::timeout("deadline exceeded"))
            }),
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.attempts(), 3);
    assert_eq!(err.error_kind(), Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn test_breaker_opens_then_recovers_through_probe() {
    let clock = MockClock::new();
    let invoker = ResilientInvoker::builder()
        .defaults(ResilienceConfig {
            retry: fast_retry(1),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 3,
                cooldown: Duration::from_secs(30),
                ..Default::default()
            },
            ..Default::default()
        })
        .target("payments")
        .clock(clock.clone())
        .build()
        .expect("valid config");

    for _ in 0..3 {
        let result: Result<(), _> = invoker
            .execute(
                "payments",
                Operation::new("charge", || async {
                    Err(CallError::service(500, "boom"))
                }),
            )
            .await;
        assert!(matches!(
            result,
            Err(InvocationError::OperationFailed { .. })
        ));
    }

    // Threshold reached: calls short-circuit without running the operation.
    let ran = Arc::new(AtomicU32::new(0));
    let ran_in_op = Arc::clone(&ran);
    let result = invoker
        .execute(
            "payments",
            Operation::new("charge", move || {
                let ran = Arc::clone(&ran_in_op);
                async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .await;
    assert!(matches!(result, Err(InvocationError::CircuitOpen { .. })));
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    // After the cooldown a single probe is admitted and its success closes
    // the circuit for everyone.
    clock.advance(Duration::from_secs(30));
    assert_ok!(
        invoker
            .execute(
                "payments",
                Operation::new("charge", || async { Ok::<_, CallError>(()) }),
            )
            .await
    );

    let report = invoker.health().snapshot("payments").expect("registered");
    assert_eq!(report.state, CircuitState::Closed);
    assert_eq!(report.consecutive_failures, 0);
}

#[tokio::test]
async fn test_circuit_open_rejection_is_never_retried() {
    let invoker = ResilientInvoker::builder()
        .defaults(ResilienceConfig {
            retry: fast_retry(5),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(3600),
                ..Default::default()
            },
            ..Default::default()
        })
        .target("payments")
        .build()
        .expect("valid config");

    // The first failure trips the breaker, so the retry loop's second pass
    // hits an open circuit and stops there despite its generous attempt
    // budget.
    let first = invoker
        .execute(
            "payments",
            Operation::new("charge", || async {
                Err::<(), _>(CallError::connection("refused"))
            }),
        )
        .await;
    assert!(matches!(
        first,
        Err(InvocationError::CircuitOpen { .. })
    ));

    let result: Result<(), _> = invoker
        .execute("payments", Operation::new("charge", || async { Ok(()) }))
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, InvocationError::CircuitOpen { .. }));
    assert_eq!(err.attempts(), 0);
}

#[tokio::test]
async fn test_rate_limiter_rejects_excess_burst_terminally() {
    let clock = MockClock::new();
    let invoker = ResilientInvoker::builder()
        .defaults(ResilienceConfig {
            rate_limit: RateLimitConfig {
                capacity: 10,
                refill_per_second: 10.0,
            },
            retry: fast_retry(5),
            ..Default::default()
        })
        .target("search")
        .clock(clock.clone())
        .build()
        .expect("valid config");

    for _ in 0..10 {
        assert_ok!(
            invoker
                .execute("search", Operation::new("query", || async { Ok(1) }))
                .await
        );
    }

    let result = invoker
        .execute("search", Operation::new("query", || async { Ok(1) }))
        .await;
    match result.unwrap_err() {
        InvocationError::RateLimited {
            target,
            retry_after,
        } => {
            assert_eq!(target, "search");
            assert_eq!(retry_after, Duration::from_millis(100));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }

    // Refill admits the next call.
    clock.advance(Duration::from_millis(100));
    assert_ok!(
        invoker
            .execute("search", Operation::new("query", || async { Ok(1) }))
            .await
    );
}

#[tokio::test]
async fn test_client_errors_fail_fast_and_spare_the_breaker() {
    let invoker = ResilientInvoker::builder()
        .defaults(ResilienceConfig {
            retry: fast_retry(5),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            },
            ..Default::default()
        })
        .target("payments")
        .build()
        .expect("valid config");

    for _ in 0..5 {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = Arc::clone(&calls);
        let result: Result<(), _> = invoker
            .execute(
                "payments",
                Operation::new("charge", move || {
                    let calls = Arc::clone(&calls_in_op);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(CallError::client(400, "bad request"))
                    }
                }),
            )
            .await;

        assert_eq!(result.unwrap_err().attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "client errors never retry");
    }

    // Even at threshold 1 the breaker ignored every one of them.
    let report = invoker.health().snapshot("payments").expect("registered");
    assert_eq!(report.state, CircuitState::Closed);
    assert_eq!(report.consecutive_failures, 0);
}

#[tokio::test]
async fn test_cancellation_counts_nothing() {
    let invoker = ResilientInvoker::builder()
        .defaults(ResilienceConfig {
            retry: fast_retry(5),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            },
            ..Default::default()
        })
        .target("payments")
        .build()
        .expect("valid config");

    let result: Result<(), _> = invoker
        .execute(
            "payments",
            Operation::new("charge", || async { Err(CallError::cancelled()) }),
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(err.attempts(), 1);

    let report = invoker.health().snapshot("payments").expect("registered");
    assert_eq!(report.state, CircuitState::Closed);
    assert_eq!(report.consecutive_failures, 0);
    assert_eq!(report.rolling_error_rate, 0.0);
}

#[tokio::test]
async fn test_slow_attempts_are_cut_off_and_classified_as_timeouts() {
    let invoker = ResilientInvoker::builder()
        .defaults(ResilienceConfig {
            retry: fast_retry(2),
            ..Default::default()
        })
        .target("payments")
        .build()
        .expect("valid config");

    let result: Result<(), _> = invoker
        .execute(
            "payments",
            Operation::new("charge", || std::future::pending::<Result<(), CallError>>())
                .with_timeout(Duration::from_millis(20)),
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.error_kind(), Some(ErrorKind::Timeout));
    assert_eq!(err.attempts(), 2);
}

#[tokio::test]
async fn test_concurrent_calls_share_one_invoker() {
    let invoker = Arc::new(
        ResilientInvoker::builder()
            .target("search")
            .build()
            .expect("valid config"),
    );

    let mut futures = Vec::new();
    for i in 0..20 {
        let invoker = Arc::clone(&invoker);
        futures.push(async move {
            invoker
                .execute("search", Operation::new("query", move || async move { Ok(i) }))
                .await
        });
    }

    let results = futures::future::join_all(futures).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(assert_ok!(result), i);
    }
}

#[tokio::test]
async fn test_metrics_record_attempts_and_rejections() {
    let metrics = Arc::new(InMemoryMetricsCollector::new());
    let invoker = ResilientInvoker::builder()
        .defaults(ResilienceConfig {
            rate_limit: RateLimitConfig {
                capacity: 1,
                refill_per_second: 0.001,
            },
            ..Default::default()
        })
        .target("payments")
        .metrics(Arc::clone(&metrics) as Arc<dyn crate::observability::MetricsCollector>)
        .build()
        .expect("valid config");

    assert_ok!(
        invoker
            .execute("payments", Operation::new("charge", || async { Ok(()) }))
            .await
    );
    let _ = invoker
        .execute("payments", Operation::new("charge", || async { Ok(()) }))
        .await;

    let attempts_key = format!("{}:target=payments,outcome=success", metric_names::ATTEMPTS);
    assert_eq!(metrics.get_counter(&attempts_key), 1);

    let rejected_key = format!(
        "{}:target=payments,reason=rate_limited",
        metric_names::REJECTED
    );
    assert_eq!(metrics.get_counter(&rejected_key), 1);

    let latency_key = format!("{}:target=payments", metric_names::ATTEMPT_LATENCY_MS);
    assert_eq!(metrics.get_histogram(&latency_key).len(), 1);
}

#[tokio::test]
async fn test_targets_are_isolated() {
    let invoker = ResilientInvoker::builder()
        .defaults(ResilienceConfig {
            retry: fast_retry(1),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(3600),
                ..Default::default()
            },
            ..Default::default()
        })
        .target("payments")
        .target("search")
        .build()
        .expect("valid config");

    let _ = invoker
        .execute(
            "payments",
            Operation::new("charge", || async {
                Err::<(), _>(CallError::service(500, "boom"))
            }),
        )
        .await;

    // The payments breaker tripped; search is untouched.
    assert!(matches!(
        invoker
            .execute("payments", Operation::new("charge", || async { Ok(()) }))
            .await,
        Err(InvocationError::CircuitOpen { .. })
    ));
    assert_ok!(
        invoker
            .execute("search", Operation::new("query", || async { Ok(()) }))
            .await
    );
}
