//! Streaming retry adapter.
//!
//! A lazy stream cannot be resumed at the element that failed, so a failure
//! restarts the whole sequence: the partial run is discarded, the failure is
//! classified, the adapter waits, and a fresh stream is requested from the
//! factory. Elements reach the caller only once a run completes, so the caller
//! never observes elements of a failed run.

use std::error::Error;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};

use crate::error::RetryError;
use crate::future::wait;
use crate::retrier::Retrier;
use crate::retry::Attempts;
use crate::sleep::{AsyncSleeper, TokioSleeper};

impl Retrier {
    /// Wrap a stream factory in this policy.
    ///
    /// `factory` is called once per attempt and must return a fresh stream
    /// starting from the beginning. Nothing runs until the returned stream is
    /// polled. A terminal failure ends the stream with a single `Err` item.
    ///
    /// # Example
    ///
    /// ```rust
    /// use futures_util::{StreamExt, stream};
    /// use retry_machines::{Retrier, RetryPolicyConfig};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let retrier = Retrier::new(RetryPolicyConfig::builder("pages").build().unwrap());
    ///
    /// let pages: Vec<_> = retrier
    ///     .stream(|| stream::iter(vec![Ok::<_, std::io::Error>(1), Ok(2)]))
    ///     .collect()
    ///     .await;
    ///
    /// assert_eq!(pages.len(), 2);
    /// # }
    /// ```
    pub fn stream<F, S, T, E>(
        &self,
        factory: F,
    ) -> impl Stream<Item = Result<T, RetryError<E>>> + use<F, S, T, E>
    where
        F: FnMut() -> S,
        S: Stream<Item = Result<T, E>>,
        E: Error + 'static,
    {
        self.stream_with_sleeper(Arc::new(TokioSleeper), factory)
    }

    /// Same as [`stream`](Self::stream), waiting between restarts through `sleeper`.
    pub fn stream_with_sleeper<F, S, T, E>(
        &self,
        sleeper: Arc<dyn AsyncSleeper>,
        mut factory: F,
    ) -> impl Stream<Item = Result<T, RetryError<E>>> + use<F, S, T, E>
    where
        F: FnMut() -> S,
        S: Stream<Item = Result<T, E>>,
        E: Error + 'static,
    {
        let retrier = self.clone();

        async_stream::stream! {
            let mut attempts = Attempts::new(retrier.as_state());

            loop {
                let mut run = Box::pin(factory());
                let mut buffered = Vec::new();
                let mut failure = None;

                while let Some(item) = run.next().await {
                    match item {
                        Ok(value) => buffered.push(value),
                        Err(error) => {
                            failure = Some(error);
                            break;
                        }
                    }
                }
                drop(run);

                let error = match failure {
                    Some(error) => error,
                    None => {
                        attempts.succeed();
                        for value in buffered {
                            yield Ok(value);
                        }
                        break;
                    }
                };

                tracing::trace!(
                    policy = retrier.name(),
                    discarded = buffered.len(),
                    "discarding elements of failed run"
                );

                match attempts.fail(error) {
                    Ok(delay) => {
                        wait(sleeper.as_ref(), None, delay).await;
                    }
                    Err(terminal) => {
                        yield Err(terminal);
                        break;
                    }
                }
            }
        }
    }
}
