//! Retryable-error classification.
//!
//! A [`RetryPredicate`] decides whether a failure is worth another attempt.
//! Predicates see errors as `&dyn Error`, so one predicate can serve
//! operations with unrelated error types, and a policy can be configured by
//! predicate name through a [`PredicateRegistry`].

use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Classifies failures as retryable or not.
///
/// Implementations must be pure: the same error must always yield the same
/// answer, and `test` may be called concurrently from many invocations.
pub trait RetryPredicate: Send + Sync {
    /// Name used to reference this predicate from settings.
    fn name(&self) -> &str;

    /// Return `true` when `error` should be retried.
    fn test(&self, error: &(dyn Error + 'static)) -> bool;
}

/// Retries every failure. Used when a policy names no predicate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl AlwaysRetry {
    pub const NAME: &'static str = "all";
}

impl RetryPredicate for AlwaysRetry {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn test(&self, _error: &(dyn Error + 'static)) -> bool {
        true
    }
}

/// Retries failures whose error, or any error in its `source()` chain, is a `T`.
///
/// # Example
///
/// ```rust
/// use retry_machines::{ErrorTypePredicate, RetryPredicate};
///
/// let io = ErrorTypePredicate::<std::io::Error>::new("io");
/// let error = std::io::Error::other("connection reset");
/// assert!(io.test(&error));
/// ```
pub struct ErrorTypePredicate<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ErrorTypePredicate<T>
where
    T: Error + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ErrorTypePredicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorTypePredicate")
            .field("name", &self.name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> RetryPredicate for ErrorTypePredicate<T>
where
    T: Error + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn test(&self, error: &(dyn Error + 'static)) -> bool {
        let mut current = Some(error);
        while let Some(err) = current {
            if err.is::<T>() {
                return true;
            }
            current = err.source();
        }
        false
    }
}

/// Named closure predicate.
pub struct FnPredicate<F> {
    name: String,
    test: F,
}

impl<F> FnPredicate<F>
where
    F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, test: F) -> Self {
        Self {
            name: name.into(),
            test,
        }
    }
}

impl<F> fmt::Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> RetryPredicate for FnPredicate<F>
where
    F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn test(&self, error: &(dyn Error + 'static)) -> bool {
        (self.test)(error)
    }
}

/// In-memory registry of predicates, keyed by [`RetryPredicate::name`].
///
/// Lookups are linear over an internal vector; applications define a
/// handful of predicates at most.
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    entries: Vec<Arc<dyn RetryPredicate>>,
}

impl PredicateRegistry {
    /// Create a registry holding only [`AlwaysRetry`].
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register(AlwaysRetry);
        registry
    }

    /// Insert or replace a predicate under its own name.
    ///
    /// Returns the previously registered predicate if one existed.
    pub fn register<P>(&mut self, predicate: P) -> Option<Arc<dyn RetryPredicate>>
    where
        P: RetryPredicate + 'static,
    {
        self.register_shared(Arc::new(predicate))
    }

    /// Same as [`register`](Self::register) for an already shared predicate.
    pub fn register_shared(
        &mut self,
        predicate: Arc<dyn RetryPredicate>,
    ) -> Option<Arc<dyn RetryPredicate>> {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|existing| existing.name() == predicate.name())
        {
            Some(std::mem::replace(existing, predicate))
        } else {
            self.entries.push(predicate);
            None
        }
    }

    /// Retrieve a predicate by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn RetryPredicate>> {
        self.entries
            .iter()
            .find(|existing| existing.name() == name)
            .cloned()
    }

    /// Names of all registered predicates, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|predicate| predicate.name())
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
