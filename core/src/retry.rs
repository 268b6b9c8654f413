//! Blocking retry adapter with fluent builder API
//!
//! This module also holds the attempt bookkeeping shared by every adapter:
//! classification goes through [`RetryState`], errors are accumulated in
//! order, and terminal statuses are turned into [`RetryError`]s here only.

use std::error::Error;
use std::time::Duration;

use crate::error::{RetryError, RetryExhaustedError};
use crate::retrier::Retrier;
use crate::sleep::{Sleeper, StdSleeper};
use crate::state::{RetryState, RetryStatus};

/// Retry state of one invocation plus the errors its attempts produced.
pub(crate) struct Attempts<E> {
    state: RetryState,
    causes: Vec<E>,
}

impl<E> Attempts<E>
where
    E: Error + 'static,
{
    pub(crate) fn new(state: RetryState) -> Self {
        Self {
            state,
            causes: Vec::new(),
        }
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay to wait before the next attempt, or the terminal
    /// error that ends the invocation.
    pub(crate) fn fail(&mut self, error: E) -> Result<Duration, RetryError<E>> {
        match self.state.on_exception(&error) {
            RetryStatus::Accepted => {
                self.causes.push(error);
                Ok(self.state.delay())
            }
            RetryStatus::Rejected => Err(RetryError::Rejected {
                error,
                suppressed: std::mem::take(&mut self.causes),
            }),
            RetryStatus::Exhausted => {
                self.causes.push(error);
                Err(RetryExhaustedError::new(
                    self.state.attempts(),
                    std::mem::take(&mut self.causes),
                )
                .into())
            }
        }
    }

    pub(crate) fn succeed(&mut self) {
        self.state.record_success();
    }

    /// End the invocation because the caller cancelled it mid-delay.
    #[cfg_attr(not(feature = "async"), allow(dead_code))]
    pub(crate) fn cancel(&mut self) -> RetryError<E> {
        tracing::warn!(
            policy = self.state.policy(),
            attempts = self.state.attempts(),
            "retry cancelled during backoff"
        );
        RetryError::Cancelled {
            attempts: self.state.attempts(),
            causes: std::mem::take(&mut self.causes),
        }
    }

    /// Error of the most recent accepted failure.
    pub(crate) fn last_error(&self) -> Option<&E> {
        self.causes.last()
    }
}

/// Extension trait that adds `.retry()` to closures returning `Result`
///
/// # Example
///
/// ```rust
/// use retry_machines::{Retrier, RetryPolicyConfig, Retryable};
///
/// fn fetch_data() -> Result<String, std::io::Error> {
///     // ... operation that might fail
/// #   Ok("data".to_string())
/// }
///
/// let retrier = Retrier::new(RetryPolicyConfig::builder("fetch").build().unwrap());
/// let result = fetch_data.retry(&retrier).call();
/// assert_eq!(result.unwrap(), "data");
/// ```
pub trait Retryable<T, E> {
    /// Begin building a retry operation under the given policy
    fn retry(self, retrier: &Retrier) -> RetryBuilder<'_, Self, T, E, fn(&E, Duration)>
    where
        Self: Sized;
}

impl<F, T, E> Retryable<T, E> for F
where
    F: FnMut() -> Result<T, E>,
{
    fn retry(self, retrier: &Retrier) -> RetryBuilder<'_, Self, T, E, fn(&E, Duration)> {
        RetryBuilder {
            operation: self,
            retrier,
            notify: None,
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Builder for configuring and executing a blocking retry operation
///
/// Created by calling `.retry()` on a closure.
///
/// # Type Parameters
///
/// * `F` - The operation function type
/// * `T` - The success return type
/// * `E` - The error type
/// * `N` - The notify callback type
pub struct RetryBuilder<'r, F, T, E, N> {
    operation: F,
    retrier: &'r Retrier,
    notify: Option<N>,
    _phantom: std::marker::PhantomData<fn() -> (T, E)>,
}

impl<'r, F, T, E, N> RetryBuilder<'r, F, T, E, N>
where
    F: FnMut() -> Result<T, E>,
    E: Error + 'static,
    N: FnMut(&E, Duration),
{
    /// Add a callback invoked before each retry delay
    ///
    /// The callback receives the error that triggered the retry and the
    /// delay before the next attempt.
    ///
    /// # Example
    ///
    /// ```rust
    /// use retry_machines::{ConstantBackoff, Retrier, RetryPolicyConfig, Retryable};
    ///
    /// let retrier = Retrier::new(
    ///     RetryPolicyConfig::builder("notify")
    ///         .backoff(ConstantBackoff::new().delay_ms(1))
    ///         .build()
    ///         .unwrap(),
    /// );
    ///
    /// let mut calls = 0;
    /// let result = (|| {
    ///     calls += 1;
    ///     if calls < 2 { Err(std::io::Error::other("flaky")) } else { Ok(calls) }
    /// })
    /// .retry(&retrier)
    /// .notify(|err, delay| println!("Retrying after {:?}: {}", delay, err))
    /// .call();
    ///
    /// assert_eq!(result.unwrap(), 2);
    /// ```
    pub fn notify<C>(self, callback: C) -> RetryBuilder<'r, F, T, E, C>
    where
        C: FnMut(&E, Duration),
    {
        RetryBuilder {
            operation: self.operation,
            retrier: self.retrier,
            notify: Some(callback),
            _phantom: std::marker::PhantomData,
        }
    }

    /// Execute the operation, blocking the thread between attempts
    pub fn call(self) -> Result<T, RetryError<E>> {
        self.call_with_sleeper(&StdSleeper)
    }

    /// Execute the operation with a custom sleeper
    ///
    /// Attempts run strictly one after another on the calling thread; the
    /// sleeper is the only place the loop waits.
    pub fn call_with_sleeper<S>(mut self, sleeper: &S) -> Result<T, RetryError<E>>
    where
        S: Sleeper + ?Sized,
    {
        let mut attempts = Attempts::new(self.retrier.as_state());

        loop {
            match (self.operation)() {
                Ok(value) => {
                    attempts.succeed();
                    return Ok(value);
                }
                Err(error) => {
                    let delay = attempts.fail(error)?;

                    if let (Some(notify), Some(error)) =
                        (self.notify.as_mut(), attempts.last_error())
                    {
                        notify(error, delay);
                    }

                    sleeper.sleep(delay);
                }
            }
        }
    }
}

impl Retrier {
    /// Run a blocking operation under this policy.
    ///
    /// The calling thread sleeps between attempts.
    pub fn call<F, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Error + 'static,
    {
        operation.retry(self).call()
    }

    /// Run a blocking operation, waiting between attempts through `sleeper`.
    pub fn call_with_sleeper<S, F, T, E>(
        &self,
        sleeper: &S,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        S: Sleeper + ?Sized,
        F: FnMut() -> Result<T, E>,
        E: Error + 'static,
    {
        operation.retry(self).call_with_sleeper(sleeper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::{ConstantBackoff, ExponentialBackoff};
    use crate::config::RetryPolicyConfig;
    use crate::predicate::ErrorTypePredicate;
    use crate::sleep::FnSleeper;
    use std::cell::{Cell, RefCell};
    use std::io;

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum TestError {
        #[error("retryable failure {0}")]
        Retryable(u32),
        #[error("fatal failure")]
        Fatal,
    }

    fn retrier(max_attempts: u32) -> Retrier {
        Retrier::new(
            RetryPolicyConfig::builder("test")
                .max_attempts(max_attempts)
                .backoff(
                    ExponentialBackoff::new()
                        .base_delay_ms(10)
                        .multiplier(2.0)
                        .jitter_factor(0.0),
                )
                .predicate(crate::predicate::FnPredicate::new(
                    "retryable",
                    |error: &(dyn Error + 'static)| {
                        matches!(
                            error.downcast_ref::<TestError>(),
                            Some(TestError::Retryable(_))
                        )
                    },
                ))
                .build()
                .unwrap(),
        )
    }

    fn no_sleep() -> FnSleeper<fn(Duration)> {
        FnSleeper(|_| {})
    }

    #[test]
    fn test_retry_success_on_first_attempt() {
        fn always_succeeds() -> Result<i32, TestError> {
            Ok(42)
        }

        let result = always_succeeds
            .retry(&retrier(3))
            .call_with_sleeper(&no_sleep());

        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_retry_success_after_failures() {
        let attempts = Cell::new(0);
        let delays = RefCell::new(Vec::new());

        let operation = || {
            let current = attempts.get();
            attempts.set(current + 1);

            if current < 2 {
                Err(TestError::Retryable(current))
            } else {
                Ok(42)
            }
        };

        let result = operation
            .retry(&retrier(3))
            .call_with_sleeper(&FnSleeper(|delay: Duration| delays.borrow_mut().push(delay)));

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
        assert_eq!(
            *delays.borrow(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[test]
    fn test_retry_exhausted() {
        let attempts = Cell::new(0);

        let result: Result<(), _> = retrier(3).call_with_sleeper(&no_sleep(), || {
            let current = attempts.get();
            attempts.set(current + 1);
            Err(TestError::Retryable(current))
        });

        assert_eq!(attempts.get(), 3);
        let err = result.unwrap_err();
        let exhausted = err.exhausted().expect("expected exhaustion");
        assert_eq!(exhausted.attempts(), 3);
        assert_eq!(
            exhausted.causes(),
            &[
                TestError::Retryable(0),
                TestError::Retryable(1),
                TestError::Retryable(2)
            ]
        );
    }

    #[test]
    fn test_retry_rejected_error_propagates_unchanged() {
        let attempts = Cell::new(0);

        let result: Result<(), _> = retrier(5).call_with_sleeper(&no_sleep(), || {
            attempts.set(attempts.get() + 1);
            Err(TestError::Fatal)
        });

        assert_eq!(attempts.get(), 1);
        assert_eq!(result.unwrap_err().into_rejected(), Some(TestError::Fatal));
    }

    #[test]
    fn test_rejection_keeps_earlier_errors_suppressed() {
        let attempts = Cell::new(0);

        let result: Result<(), _> = retrier(5).call_with_sleeper(&no_sleep(), || {
            let current = attempts.get();
            attempts.set(current + 1);
            if current < 2 {
                Err(TestError::Retryable(current))
            } else {
                Err(TestError::Fatal)
            }
        });

        match result.unwrap_err() {
            RetryError::Rejected { error, suppressed } => {
                assert_eq!(error, TestError::Fatal);
                assert_eq!(
                    suppressed,
                    vec![TestError::Retryable(0), TestError::Retryable(1)]
                );
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_retry_notify_callback() {
        let attempts = Cell::new(0);
        let notified = RefCell::new(Vec::new());

        let operation = || {
            let current = attempts.get();
            attempts.set(current + 1);

            if current < 2 {
                Err(TestError::Retryable(current))
            } else {
                Ok(42)
            }
        };

        let result = operation
            .retry(&retrier(3))
            .notify(|err: &TestError, delay| notified.borrow_mut().push((err.to_string(), delay)))
            .call_with_sleeper(&no_sleep());

        assert_eq!(result.unwrap(), 42);
        assert_eq!(
            *notified.borrow(),
            vec![
                ("retryable failure 0".to_string(), Duration::from_millis(10)),
                ("retryable failure 1".to_string(), Duration::from_millis(20)),
            ]
        );
    }

    #[test]
    fn test_retry_with_std_sleeper() {
        let retrier = Retrier::new(
            RetryPolicyConfig::builder("io")
                .max_attempts(2)
                .backoff(ConstantBackoff::new().delay_ms(10).jitter_factor(0.0))
                .predicate(ErrorTypePredicate::<io::Error>::new("io"))
                .build()
                .unwrap(),
        );

        let attempts = Cell::new(0);
        let start = std::time::Instant::now();
        let result = retrier.call(|| {
            let current = attempts.get();
            attempts.set(current + 1);
            if current < 1 {
                Err(io::Error::other("reset"))
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert!(start.elapsed().as_millis() >= 10); // At least one 10ms sleep
    }
}
