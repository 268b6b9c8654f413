use std::cell::{Cell, RefCell};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use futures_util::{StreamExt, stream};
use retry_machines::{
    ConstantBackoff, ErrorTypePredicate, ExponentialBackoff, FnSleeper, PredicateRegistry,
    Retrier, RetrierManager, RetryError, RetryPolicyConfig, RetrySettings,
};

#[derive(Debug, thiserror::Error)]
enum ServiceError {
    #[error("io failure")]
    Io(#[from] io::Error),
    #[error("validation failed: {0}")]
    Validation(String),
}

fn manager() -> RetrierManager {
    let settings: RetrySettings = toml::from_str(
        r#"
        [policies.io]
        max_attempts = 3
        predicate = "io"

        [policies.io.backoff]
        kind = "constant"
        delay_ms = 10
        jitter_factor = 0.0

        [policies.exponential]
        max_attempts = 6
        predicate = "io"

        [policies.exponential.backoff]
        kind = "exponential"
        base_delay_ms = 100
        multiplier = 2.0
        max_delay_ms = 1000
        jitter_factor = 0.0
        "#,
    )
    .unwrap();

    let mut predicates = PredicateRegistry::new();
    predicates.register(ErrorTypePredicate::<io::Error>::new("io"));

    RetrierManager::from_settings(&settings, &predicates).unwrap()
}

fn io_failure() -> ServiceError {
    ServiceError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
}

fn no_sleep() -> FnSleeper<fn(Duration)> {
    FnSleeper(|_| {})
}

#[test]
fn scenario_a_sync_success_on_third_attempt() {
    let retrier = manager().get("io").unwrap();
    let calls = Cell::new(0);
    let start = Instant::now();

    let result = retrier.call(|| {
        calls.set(calls.get() + 1);
        if calls.get() < 3 {
            Err(io_failure())
        } else {
            Ok("payload")
        }
    });

    assert_eq!(result.unwrap(), "payload");
    assert_eq!(calls.get(), 3);
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[tokio::test(start_paused = true)]
async fn scenario_a_async_success_on_third_attempt() {
    let retrier = manager().get("io").unwrap();
    let calls = AtomicU32::new(0);
    let start = tokio::time::Instant::now();

    let result = retrier
        .call_async(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(io_failure())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 3);
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[test]
fn scenario_b_always_failing_is_exhausted() {
    let retrier = manager().get("io").unwrap();
    let calls = Cell::new(0u32);

    let result: Result<(), _> = retrier.call_with_sleeper(&no_sleep(), || {
        calls.set(calls.get() + 1);
        Err(ServiceError::Io(io::Error::other(format!("attempt {}", calls.get()))))
    });

    let err = result.unwrap_err();
    let exhausted = err.exhausted().expect("expected exhaustion");
    assert_eq!(calls.get(), 3);
    assert_eq!(exhausted.attempts(), 3);

    let messages: Vec<String> = exhausted
        .causes()
        .iter()
        .map(|cause| match cause {
            ServiceError::Io(io) => io.to_string(),
            other => panic!("unexpected cause {other:?}"),
        })
        .collect();
    assert_eq!(messages, vec!["attempt 1", "attempt 2", "attempt 3"]);
}

#[test]
fn scenario_c_validation_error_propagates_immediately() {
    let retrier = manager().get("io").unwrap();
    let calls = Cell::new(0);

    let result: Result<(), _> = retrier.call_with_sleeper(&no_sleep(), || {
        calls.set(calls.get() + 1);
        Err(ServiceError::Validation("amount must be positive".into()))
    });

    assert_eq!(calls.get(), 1);
    match result.unwrap_err() {
        RetryError::Rejected { error, suppressed } => {
            assert_eq!(error.to_string(), "validation failed: amount must be positive");
            assert!(suppressed.is_empty());
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_d_stream_restarts_from_the_beginning() {
    let retrier = manager().get("io").unwrap();
    let subscriptions = AtomicU32::new(0);

    let items: Vec<_> = retrier
        .stream(|| {
            if subscriptions.fetch_add(1, Ordering::SeqCst) == 0 {
                stream::iter(vec![Ok("a"), Ok("b"), Err(io_failure())])
            } else {
                stream::iter(vec![Ok("a"), Ok("b"), Ok("c"), Ok("d")])
            }
        })
        .collect()
        .await;

    let values: Vec<&str> = items.into_iter().map(Result::unwrap).collect();
    assert_eq!(values, vec!["a", "b", "c", "d"]);
    assert_eq!(subscriptions.load(Ordering::SeqCst), 2);
}

#[test]
fn sync_invocations_never_exceed_max_attempts() {
    for max_attempts in 1..=5 {
        let retrier = Retrier::new(
            RetryPolicyConfig::builder("bounded")
                .max_attempts(max_attempts)
                .backoff(ConstantBackoff::new().delay_ms(1))
                .build()
                .unwrap(),
        );
        let calls = Cell::new(0);

        let result: Result<(), _> = retrier.call_with_sleeper(&no_sleep(), || {
            calls.set(calls.get() + 1);
            Err(io::Error::other("down"))
        });

        assert_eq!(calls.get(), max_attempts);
        let err = result.unwrap_err();
        let exhausted = err.exhausted().unwrap();
        assert_eq!(exhausted.attempts(), max_attempts);
        assert_eq!(exhausted.causes().len(), max_attempts as usize);
    }
}

#[tokio::test(start_paused = true)]
async fn async_and_stream_invocations_never_exceed_max_attempts() {
    for max_attempts in 1..=4 {
        let retrier = Retrier::new(
            RetryPolicyConfig::builder("bounded")
                .max_attempts(max_attempts)
                .backoff(ConstantBackoff::new().delay_ms(5))
                .build()
                .unwrap(),
        );

        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retrier
            .call_async(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(io::Error::other("down")) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
        assert_eq!(result.unwrap_err().exhausted().unwrap().attempts(), max_attempts);

        let subscriptions = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&subscriptions);
        let items: Vec<Result<u8, _>> = retrier
            .stream(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                stream::iter(vec![Ok(1), Err(io::Error::other("down"))])
            })
            .collect()
            .await;
        assert_eq!(subscriptions.load(Ordering::SeqCst), max_attempts);
        assert_eq!(items.len(), 1);
    }
}

#[test]
fn exponential_delays_double_and_cap() {
    let retrier = manager().get("exponential").unwrap();
    let delays = RefCell::new(Vec::new());

    let result: Result<(), _> = retrier.call_with_sleeper(
        &FnSleeper(|delay: Duration| delays.borrow_mut().push(delay.as_millis() as u64)),
        || Err(io_failure()),
    );

    assert!(result.unwrap_err().is_exhausted());
    assert_eq!(*delays.borrow(), vec![100, 200, 400, 800, 1000]);
}

#[test]
fn identical_failure_sequences_yield_identical_outcomes() {
    let run = || {
        let retrier = Retrier::new(
            RetryPolicyConfig::builder("deterministic")
                .max_attempts(4)
                .backoff(ExponentialBackoff::new().base_delay_ms(10).jitter_factor(0.0))
                .predicate(ErrorTypePredicate::<io::Error>::new("io"))
                .build()
                .unwrap(),
        );
        let delays = RefCell::new(Vec::new());
        let calls = Cell::new(0);

        let result: Result<(), _> = retrier.call_with_sleeper(
            &FnSleeper(|delay: Duration| delays.borrow_mut().push(delay)),
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(io_failure())
                } else {
                    Err(ServiceError::Validation("bad".into()))
                }
            },
        );

        (result.unwrap_err().is_rejected(), calls.get(), delays.into_inner())
    };

    let first = run();
    assert_eq!(first, (true, 3, vec![Duration::from_millis(10), Duration::from_millis(20)]));
    assert_eq!(first, run());
}

#[test]
fn unknown_policy_is_a_wiring_error() {
    let err = manager().get("unknown").unwrap_err();
    assert_eq!(err.to_string(), "retry policy 'unknown' is not registered");
}
