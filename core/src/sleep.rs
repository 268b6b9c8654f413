//! Sleep abstraction for the retry adapters
//!
//! The blocking adapter waits through a [`Sleeper`]; the suspending and
//! streaming adapters wait through an [`AsyncSleeper`]. Swapping either one
//! out lets tests observe requested delays without waiting for them.

use std::time::Duration;

/// Trait for blocking sleep implementations
pub trait Sleeper {
    /// Block the current thread for `delay`
    fn sleep(&self, delay: Duration);
}

/// Standard library sleeper using `std::thread::sleep`
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use retry_machines::sleep::{Sleeper, StdSleeper};
///
/// let sleeper = StdSleeper;
/// sleeper.sleep(Duration::from_millis(10));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct StdSleeper;

impl Sleeper for StdSleeper {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Closure sleeper for custom sleep implementations
///
/// Useful for recording the delays a policy asks for in tests.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::time::Duration;
/// use retry_machines::sleep::{FnSleeper, Sleeper};
///
/// let requested = RefCell::new(Vec::new());
/// let sleeper = FnSleeper(|delay: Duration| requested.borrow_mut().push(delay));
/// sleeper.sleep(Duration::from_millis(100));
/// assert_eq!(requested.borrow().len(), 1);
/// ```
#[derive(Clone, Copy)]
pub struct FnSleeper<F>(pub F);

impl<F> Sleeper for FnSleeper<F>
where
    F: Fn(Duration),
{
    fn sleep(&self, delay: Duration) {
        (self.0)(delay);
    }
}

/// Trait for cooperative, non-blocking sleep implementations
#[cfg(feature = "async")]
#[async_trait::async_trait]
pub trait AsyncSleeper: Send + Sync {
    /// Suspend the current task for `delay` without blocking its worker thread
    async fn sleep(&self, delay: Duration);
}

/// Tokio sleeper using `tokio::time::sleep`
///
/// Dropping the returned future aborts the wait immediately.
#[cfg(feature = "async")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncSleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
