//! RetryMachines - named retry policies for blocking, async, and streaming calls
//!
//! A policy bundles a maximum attempt count, a backoff shape, and a predicate
//! deciding which errors are worth retrying. Policies are registered by name
//! in a [`RetrierManager`]; callers look up a [`Retrier`] and wrap their
//! operation with one of three adapters that share the same state machine:
//!
//! - [`Retrier::call`] for blocking closures (sleeps the thread between attempts),
//! - `Retrier::call_async` for futures (suspends the task between attempts),
//! - `Retrier::stream` for lazy streams (restarts the whole stream on failure).
//!
//! The async adapters need the `async` feature, enabled by default.
//!
//! Every invocation makes at most `max_attempts` attempts and ends with the
//! operation's value, the rejected original error, or a
//! [`RetryExhaustedError`] holding every attempt's error in order.
//!
//! # Example
//!
//! ```rust
//! use retry_machines::{
//!     ConstantBackoff, ErrorTypePredicate, RetrierManager, RetryPolicyConfig,
//! };
//!
//! let manager = RetrierManager::new([RetryPolicyConfig::builder("storage")
//!     .max_attempts(3)
//!     .backoff(ConstantBackoff::new().delay_ms(1))
//!     .predicate(ErrorTypePredicate::<std::io::Error>::new("io"))
//!     .build()
//!     .unwrap()])
//! .unwrap();
//!
//! let retrier = manager.get("storage").unwrap();
//! let mut attempts = 0;
//! let value = retrier
//!     .call(|| {
//!         attempts += 1;
//!         if attempts < 3 {
//!             Err(std::io::Error::other("disk busy"))
//!         } else {
//!             Ok(attempts)
//!         }
//!     })
//!     .unwrap();
//!
//! assert_eq!(value, 3);
//! ```

pub mod backoff;
pub mod config;
pub mod error;
#[cfg(feature = "async")]
pub mod future;
pub mod manager;
pub mod predicate;
pub mod retrier;
pub mod retry;
pub mod sleep;
pub mod state;
#[cfg(feature = "async")]
pub mod stream;

pub use backoff::{
    BackoffPolicy, BackoffStrategy, ConstantBackoff, ExponentialBackoff, FibonacciBackoff,
};
pub use config::{PolicySettings, RetryPolicyBuilder, RetryPolicyConfig, RetrySettings};
pub use error::{ConfigurationError, RetryError, RetryExhaustedError};
pub use manager::{RetrierManager, retrier};
pub use predicate::{AlwaysRetry, ErrorTypePredicate, FnPredicate, PredicateRegistry, RetryPredicate};
pub use retrier::Retrier;
pub use retry::{RetryBuilder, Retryable};
#[cfg(feature = "async")]
pub use sleep::{AsyncSleeper, TokioSleeper};
pub use sleep::{FnSleeper, Sleeper, StdSleeper};
pub use state::{RetryState, RetryStatus};
#[cfg(feature = "async")]
pub use tokio_util::sync::CancellationToken;
