//! Named retry policy handle.

use std::sync::Arc;

use crate::config::RetryPolicyConfig;
use crate::state::RetryState;

/// A named retry policy.
///
/// `Retrier` is a cheap, clonable handle over an immutable
/// [`RetryPolicyConfig`]. It carries no per-call state: each invocation gets
/// its own [`RetryState`] from [`as_state`](Self::as_state), so one retrier can
/// serve any number of concurrent invocations.
///
/// The execution adapters live alongside: [`call`](Self::call) for blocking
/// operations, `call_async` for futures and `stream` for lazy streams (the
/// latter two behind the `async` feature).
#[derive(Debug, Clone)]
pub struct Retrier {
    config: Arc<RetryPolicyConfig>,
}

impl Retrier {
    pub fn new(config: RetryPolicyConfig) -> Self {
        Self::from_shared(Arc::new(config))
    }

    pub(crate) fn from_shared(config: Arc<RetryPolicyConfig>) -> Self {
        Self { config }
    }

    /// Open the retry state for one invocation.
    ///
    /// The state is released when dropped, on success and failure alike.
    pub fn as_state(&self) -> RetryState {
        RetryState::new(Arc::clone(&self.config))
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts()
    }

    pub fn config(&self) -> &RetryPolicyConfig {
        &self.config
    }
}

impl From<RetryPolicyConfig> for Retrier {
    fn from(value: RetryPolicyConfig) -> Self {
        Retrier::new(value)
    }
}
