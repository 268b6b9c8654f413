//! Backoff shapes for retry delays
//!
//! Each shape maps the number of failures seen so far (1-indexed) to the delay
//! before the next attempt. Shapes are pure: given the same attempt and the
//! same random draw they always produce the same delay.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Trait for backoff shapes that calculate delays between retry attempts
pub trait BackoffStrategy {
    /// Calculate the delay before the attempt following failure number `attempt`
    ///
    /// # Arguments
    ///
    /// * `attempt` - Number of failures seen so far (1-indexed)
    /// * `rng` - Random number generator for jitter
    fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration;
}

/// Exponential backoff with configurable jitter
///
/// Delays grow exponentially: base_delay * multiplier^(attempt-1), capped at
/// `max_delay_ms` when one is set.
///
/// # Example
///
/// ```rust
/// use retry_machines::ExponentialBackoff;
///
/// let backoff = ExponentialBackoff::new()
///     .base_delay_ms(100)
///     .multiplier(2.0)
///     .max_delay_ms(10_000)
///     .jitter_factor(1.0); // Full jitter
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExponentialBackoff {
    /// Base delay in milliseconds
    pub base_delay_ms: u64,
    /// Exponential backoff multiplier
    pub multiplier: f64,
    /// Maximum delay cap in milliseconds, `None` for uncapped growth
    pub max_delay_ms: Option<u64>,
    /// Jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub jitter_factor: f64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base delay in milliseconds
    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    /// Set the exponential multiplier
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the maximum delay cap in milliseconds
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = Some(ms);
        self
    }

    /// Remove the delay cap
    pub fn uncapped(mut self) -> Self {
        self.max_delay_ms = None;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: Some(10_000),
            jitter_factor: 1.0, // Full jitter by default
        }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_exponential = (self.base_delay_ms as f64) * self.multiplier.powi(exponent);
        let capped = cap(base_exponential, self.max_delay_ms);

        apply_jitter(capped, self.jitter_factor, rng)
    }
}

/// Constant backoff strategy with fixed delay
///
/// All retry delays are the same constant value.
///
/// # Example
///
/// ```rust
/// use retry_machines::ConstantBackoff;
///
/// let backoff = ConstantBackoff::new()
///     .delay_ms(500)
///     .jitter_factor(0.1); // 10% jitter
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConstantBackoff {
    /// Fixed delay in milliseconds
    pub delay_ms: u64,
    /// Jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub jitter_factor: f64,
}

impl ConstantBackoff {
    /// Create a new constant backoff builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the constant delay in milliseconds
    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }
}

impl Default for ConstantBackoff {
    fn default() -> Self {
        Self {
            delay_ms: 100,
            jitter_factor: 0.0, // No jitter for constant by default
        }
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn delay<R: Rng>(&self, _attempt: u32, rng: &mut R) -> Duration {
        apply_jitter(self.delay_ms as f64, self.jitter_factor, rng)
    }
}

/// Fibonacci backoff strategy
///
/// Delays follow the Fibonacci sequence: 1, 1, 2, 3, 5, 8, 13, ...
/// Each delay is base_delay_ms * fibonacci(attempt).
///
/// # Example
///
/// ```rust
/// use retry_machines::FibonacciBackoff;
///
/// let backoff = FibonacciBackoff::new()
///     .base_delay_ms(100)  // 100ms, 100ms, 200ms, 300ms, 500ms...
///     .max_delay_ms(5_000)
///     .jitter_factor(0.5); // 50% jitter
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FibonacciBackoff {
    /// Base delay in milliseconds (multiplied by Fibonacci number)
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds, `None` for uncapped growth
    pub max_delay_ms: Option<u64>,
    /// Jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub jitter_factor: f64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base delay in milliseconds
    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    /// Set the maximum delay cap in milliseconds
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = Some(ms);
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Calculate the nth Fibonacci number (1-indexed)
    fn fibonacci(n: u32) -> u64 {
        match n {
            0 => 0,
            1 | 2 => 1,
            _ => {
                let mut a = 1u64;
                let mut b = 1u64;
                for _ in 2..n {
                    let next = a.saturating_add(b);
                    a = b;
                    b = next;
                }
                b
            }
        }
    }
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: Some(10_000),
            jitter_factor: 1.0, // Full jitter by default
        }
    }
}

impl BackoffStrategy for FibonacciBackoff {
    fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let fib = Self::fibonacci(attempt);
        let base = cap((self.base_delay_ms as f64) * (fib as f64), self.max_delay_ms);

        apply_jitter(base, self.jitter_factor, rng)
    }
}

/// Backoff policy that can represent any supported shape.
///
/// This is the form stored in a [`RetryPolicyConfig`](crate::RetryPolicyConfig)
/// and deserialized from settings, tagged by `kind`:
///
/// ```toml
/// kind = "exponential"
/// base_delay_ms = 50
/// multiplier = 2.0
/// max_delay_ms = 2000
/// jitter_factor = 0.0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Exponential backoff policy
    Exponential(ExponentialBackoff),
    /// Constant backoff policy
    Constant(ConstantBackoff),
    /// Fibonacci backoff policy
    Fibonacci(FibonacciBackoff),
}

impl BackoffPolicy {
    /// Check the shape's parameters, returning a reason when they are unusable.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            BackoffPolicy::Exponential(policy) => {
                if !policy.multiplier.is_finite() || policy.multiplier <= 0.0 {
                    return Err(format!(
                        "multiplier must be a positive finite number (got {})",
                        policy.multiplier
                    ));
                }
                Ok(())
            }
            BackoffPolicy::Constant(_) | BackoffPolicy::Fibonacci(_) => Ok(()),
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential(ExponentialBackoff::default())
    }
}

impl BackoffStrategy for BackoffPolicy {
    fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        match self {
            BackoffPolicy::Exponential(policy) => policy.delay(attempt, rng),
            BackoffPolicy::Constant(policy) => policy.delay(attempt, rng),
            BackoffPolicy::Fibonacci(policy) => policy.delay(attempt, rng),
        }
    }
}

impl From<ExponentialBackoff> for BackoffPolicy {
    fn from(value: ExponentialBackoff) -> Self {
        BackoffPolicy::Exponential(value)
    }
}

impl From<ConstantBackoff> for BackoffPolicy {
    fn from(value: ConstantBackoff) -> Self {
        BackoffPolicy::Constant(value)
    }
}

impl From<FibonacciBackoff> for BackoffPolicy {
    fn from(value: FibonacciBackoff) -> Self {
        BackoffPolicy::Fibonacci(value)
    }
}

fn cap(delay_ms: f64, max_delay_ms: Option<u64>) -> f64 {
    match max_delay_ms {
        Some(max) => delay_ms.min(max as f64),
        None => delay_ms,
    }
}

/// Blend between the deterministic delay and a random fraction of it.
///
/// Formula: delay * (1 - jitter_factor + rand * jitter_factor), so a factor of
/// 0.1 yields 90% to 100% of the delay and 0.0 yields exactly the delay.
fn apply_jitter<R: Rng>(delay_ms: f64, jitter_factor: f64, rng: &mut R) -> Duration {
    let jitter_factor = if jitter_factor.is_nan() {
        1.0
    } else {
        jitter_factor.clamp(0.0, 1.0)
    };

    if jitter_factor == 0.0 {
        return Duration::from_millis(delay_ms as u64);
    }

    let random_scalar: f64 = rng.random_range(0.0..=1.0);
    let jitter_blend = 1.0 - jitter_factor + random_scalar * jitter_factor;

    Duration::from_millis((delay_ms * jitter_blend) as u64)
}
