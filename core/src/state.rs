//! Per-invocation retry state machine.

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::backoff::BackoffStrategy;
use crate::config::RetryPolicyConfig;

/// Classification of one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStatus {
    /// Retryable and attempts remain; wait [`RetryState::delay`] and retry.
    Accepted,
    /// Not retryable. Terminal: the original error propagates unchanged.
    Rejected,
    /// Retryable but the last allowed attempt has been used. Terminal.
    Exhausted,
}

impl RetryStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RetryStatus::Accepted)
    }
}

/// Retry bookkeeping for a single invocation.
///
/// Obtained from [`Retrier::as_state`](crate::Retrier::as_state) when the
/// invocation begins and dropped when it ends; dropping it records the
/// outcome. A state is never shared between invocations.
///
/// Invariant: `attempts() <= max_attempts`. Once a terminal status has been
/// returned, `on_exception` keeps returning it without touching the state.
#[derive(Debug)]
pub struct RetryState {
    config: Arc<RetryPolicyConfig>,
    attempts: u32,
    delay: Duration,
    last_status: Option<RetryStatus>,
    succeeded: bool,
    started: Instant,
    rng: SmallRng,
}

impl RetryState {
    pub(crate) fn new(config: Arc<RetryPolicyConfig>) -> Self {
        Self::with_rng(config, SmallRng::from_os_rng())
    }

    pub(crate) fn with_rng(config: Arc<RetryPolicyConfig>, rng: SmallRng) -> Self {
        Self {
            config,
            attempts: 0,
            delay: Duration::ZERO,
            last_status: None,
            succeeded: false,
            started: Instant::now(),
            rng,
        }
    }

    /// Classify a failed attempt.
    ///
    /// Non-retryable errors are `Rejected` without consuming an attempt.
    /// Retryable errors consume one; the attempt that reaches `max_attempts`
    /// is `Exhausted`, any earlier one is `Accepted` with a freshly computed
    /// delay.
    pub fn on_exception(&mut self, error: &(dyn Error + 'static)) -> RetryStatus {
        if let Some(status) = self.last_status.filter(|status| status.is_terminal()) {
            tracing::warn!(
                policy = self.config.name(),
                ?status,
                "retry state queried after a terminal status"
            );
            return status;
        }

        let status = if !self.config.is_retryable(error) {
            tracing::debug!(
                policy = self.config.name(),
                attempt = self.attempts + 1,
                error = %error,
                "error is not retryable"
            );
            RetryStatus::Rejected
        } else {
            self.attempts += 1;
            if self.attempts >= self.config.max_attempts() {
                tracing::warn!(
                    policy = self.config.name(),
                    attempts = self.attempts,
                    error = %error,
                    "retry attempts exhausted"
                );
                RetryStatus::Exhausted
            } else {
                self.delay = self.config.backoff().delay(self.attempts, &mut self.rng);
                tracing::debug!(
                    policy = self.config.name(),
                    attempt = self.attempts,
                    delay_ms = self.delay.as_millis() as u64,
                    error = %error,
                    "retrying after failure"
                );
                RetryStatus::Accepted
            }
        };

        self.last_status = Some(status);
        status
    }

    /// Block the current thread for the last computed delay.
    pub fn do_delay(&self) {
        std::thread::sleep(self.delay);
    }

    /// Delay computed by the most recent `Accepted` classification.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Attempts consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts()
    }

    /// Status returned by the most recent classification, if any.
    pub fn status(&self) -> Option<RetryStatus> {
        self.last_status
    }

    pub fn policy(&self) -> &str {
        self.config.name()
    }

    /// Mark the invocation as finished successfully.
    pub fn record_success(&mut self) {
        self.succeeded = true;
    }
}

impl Drop for RetryState {
    fn drop(&mut self) {
        let outcome = match (self.succeeded, self.last_status) {
            (true, _) => "succeeded",
            (false, Some(RetryStatus::Rejected)) => "rejected",
            (false, Some(RetryStatus::Exhausted)) => "exhausted",
            (false, _) => "abandoned",
        };

        tracing::trace!(
            policy = self.config.name(),
            attempts = self.attempts,
            outcome,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "retry state released"
        );
    }
}
