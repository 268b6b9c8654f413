//! Suspending retry adapter for async operations.
//!
//! Control flow matches the blocking adapter; the only difference is that the
//! wait between attempts suspends the task instead of blocking its worker.
//! Dropping the returned future cancels the invocation, including while it is
//! waiting out a delay. [`Retrier::call_async_cancellable`] additionally turns
//! an explicit cancellation into a [`RetryError::Cancelled`] result.

use std::error::Error;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::RetryError;
use crate::retrier::Retrier;
use crate::retry::Attempts;
use crate::sleep::{AsyncSleeper, TokioSleeper};

impl Retrier {
    /// Run an async operation under this policy.
    ///
    /// `operation` is invoked once per attempt and must return a fresh future
    /// each time.
    ///
    /// # Example
    ///
    /// ```rust
    /// use retry_machines::{ConstantBackoff, Retrier, RetryPolicyConfig};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let retrier = Retrier::new(
    ///     RetryPolicyConfig::builder("fetch")
    ///         .backoff(ConstantBackoff::new().delay_ms(1))
    ///         .build()
    ///         .unwrap(),
    /// );
    ///
    /// let value = retrier
    ///     .call_async(|| async { Ok::<_, std::io::Error>(7) })
    ///     .await
    ///     .unwrap();
    /// assert_eq!(value, 7);
    /// # }
    /// ```
    pub async fn call_async<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        self.run_async(&TokioSleeper, None, operation).await
    }

    /// Run an async operation, waiting between attempts through `sleeper`.
    pub async fn call_async_with_sleeper<S, F, Fut, T, E>(
        &self,
        sleeper: &S,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        S: AsyncSleeper + ?Sized,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        self.run_async(sleeper, None, operation).await
    }

    /// Run an async operation that stops retrying once `token` is cancelled.
    ///
    /// Cancellation is observed while waiting between attempts: the wait ends
    /// immediately, no further attempt starts, and the invocation fails with
    /// [`RetryError::Cancelled`] carrying the errors seen so far.
    pub async fn call_async_cancellable<F, Fut, T, E>(
        &self,
        token: &CancellationToken,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        self.run_async(&TokioSleeper, Some(token), operation).await
    }

    async fn run_async<S, F, Fut, T, E>(
        &self,
        sleeper: &S,
        token: Option<&CancellationToken>,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        S: AsyncSleeper + ?Sized,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        let mut attempts = Attempts::new(self.as_state());

        loop {
            match operation().await {
                Ok(value) => {
                    attempts.succeed();
                    return Ok(value);
                }
                Err(error) => {
                    let delay = attempts.fail(error)?;
                    if !wait(sleeper, token, delay).await {
                        return Err(attempts.cancel());
                    }
                }
            }
        }
    }
}

/// Sleep for `delay`, returning `false` if `token` was cancelled first.
pub(crate) async fn wait<S>(
    sleeper: &S,
    token: Option<&CancellationToken>,
    delay: std::time::Duration,
) -> bool
where
    S: AsyncSleeper + ?Sized,
{
    match token {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = sleeper.sleep(delay) => true,
        },
        None => {
            sleeper.sleep(delay).await;
            true
        }
    }
}
