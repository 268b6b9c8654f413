//! Blocking retry example
//!
//! Demonstrates named policies resolved from settings and run through the
//! blocking adapter.
//!
//! Run with: RUST_LOG=retry_machines=debug cargo run --example blocking_retry

use std::io;

use retry_machines::{
    ErrorTypePredicate, PredicateRegistry, RetrierManager, RetryError, RetrySettings, Retryable,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("transport failure")]
    Transport(#[from] io::Error),
    #[error("resource not found")]
    NotFound,
}

const SETTINGS: &str = r#"
[policies.api]
max_attempts = 5
predicate = "io"

[policies.api.backoff]
kind = "exponential"
base_delay_ms = 50
multiplier = 2.0
max_delay_ms = 400
jitter_factor = 0.1

[policies.reports]
max_attempts = 3

[policies.reports.backoff]
kind = "fibonacci"
base_delay_ms = 20
jitter_factor = 0.0
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings: RetrySettings = toml::from_str(SETTINGS)?;
    let mut predicates = PredicateRegistry::new();
    predicates.register(ErrorTypePredicate::<io::Error>::new("io"));

    RetrierManager::from_settings(&settings, &predicates)?.install_global()?;
    let api = retry_machines::retrier("api")?;
    let reports = retry_machines::retrier("reports")?;

    println!("=== RetryMachines Blocking Retry Examples ===\n");

    // Example 1: transport errors are retried until the call succeeds
    println!("1. Exponential Backoff - Success after retries:");
    let mut attempt_count = 0;
    let result = (|| {
        attempt_count += 1;
        println!("   Attempt {}", attempt_count);

        if attempt_count < 3 {
            Err(ApiError::Transport(io::Error::from(io::ErrorKind::TimedOut)))
        } else {
            Ok("Success!")
        }
    })
    .retry(&api)
    .notify(|err, delay| {
        println!("   -> Retrying after {:?} due to: {}", delay, err);
    })
    .call();

    println!("   Result: {:?}\n", result);

    // Example 2: a non-retryable error stops the loop immediately
    println!("2. Rejected - NotFound is not retried:");
    attempt_count = 0;
    let result: Result<&str, _> = api.call(|| {
        attempt_count += 1;
        println!("   Attempt {}", attempt_count);
        Err(ApiError::NotFound)
    });

    if let Err(RetryError::Rejected { error, .. }) = &result {
        println!("   Rejected: {}\n", error);
    }

    // Example 3: attempts run out
    println!("3. Fibonacci Backoff - Retry exhausted:");
    attempt_count = 0;
    let result: Result<(), _> = reports.call(|| {
        attempt_count += 1;
        println!("   Attempt {}", attempt_count);
        Err(ApiError::NotFound)
    });

    if let Err(RetryError::Exhausted(exhausted)) = &result {
        println!("   {}", exhausted);
        for (index, cause) in exhausted.causes().iter().enumerate() {
            println!("     attempt {}: {}", index + 1, cause);
        }
    }

    println!("\n=== All examples completed ===");
    Ok(())
}
