//! Error types for policy wiring and retry execution.

use std::error::Error;
use std::fmt;

/// Errors raised while wiring policies, before any operation runs.
///
/// None of these are retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("retry policy name must not be empty")]
    EmptyName,

    #[error("retry policy '{0}' is not registered")]
    PolicyNotFound(String),

    #[error("retry policy '{0}' is defined more than once")]
    DuplicatePolicy(String),

    #[error("retry policy '{policy}': max_attempts must be at least 1 (got {value})")]
    InvalidMaxAttempts { policy: String, value: u32 },

    #[error("retry policy '{policy}': invalid backoff: {reason}")]
    InvalidBackoff { policy: String, reason: String },

    #[error("retry policy '{policy}' references unknown predicate '{predicate}'")]
    PredicateNotFound { policy: String, predicate: String },

    #[error("a global retrier manager is already installed")]
    GlobalAlreadyInstalled,

    #[error("no global retrier manager has been installed")]
    GlobalNotInstalled,
}

/// Terminal error after every allowed attempt failed with a retryable error.
///
/// `causes` holds one error per attempt, oldest first.
#[derive(Debug)]
pub struct RetryExhaustedError<E> {
    attempts: u32,
    causes: Vec<E>,
}

impl<E> RetryExhaustedError<E> {
    pub(crate) fn new(attempts: u32, causes: Vec<E>) -> Self {
        Self { attempts, causes }
    }

    /// Number of attempts consumed.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Errors of every attempt in chronological order.
    pub fn causes(&self) -> &[E] {
        &self.causes
    }

    /// The error of the final attempt.
    pub fn last_cause(&self) -> Option<&E> {
        self.causes.last()
    }

    pub fn into_causes(self) -> Vec<E> {
        self.causes
    }
}

impl<E> fmt::Display for RetryExhaustedError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "retry exhausted after {} attempts", self.attempts)?;
        if let Some(last) = self.causes.last() {
            write!(f, ": {last}")?;
        }
        Ok(())
    }
}

impl<E> Error for RetryExhaustedError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.causes.last().map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Terminal outcome of a retried operation that did not succeed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The policy classified `error` as not retryable. It is returned
    /// unchanged; `suppressed` holds the retryable errors of earlier attempts.
    Rejected { error: E, suppressed: Vec<E> },
    /// Every allowed attempt failed.
    Exhausted(RetryExhaustedError<E>),
    /// The invocation was cancelled while waiting between attempts.
    Cancelled { attempts: u32, causes: Vec<E> },
}

impl<E> RetryError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, RetryError::Rejected { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// The exhaustion details, when all attempts were used up.
    pub fn exhausted(&self) -> Option<&RetryExhaustedError<E>> {
        match self {
            RetryError::Exhausted(exhausted) => Some(exhausted),
            _ => None,
        }
    }

    /// The original error, when it was rejected by the policy.
    pub fn into_rejected(self) -> Option<E> {
        match self {
            RetryError::Rejected { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Every error observed during the invocation, oldest first.
    pub fn history(&self) -> Vec<&E> {
        match self {
            RetryError::Rejected { error, suppressed } => {
                suppressed.iter().chain(std::iter::once(error)).collect()
            }
            RetryError::Exhausted(exhausted) => exhausted.causes().iter().collect(),
            RetryError::Cancelled { causes, .. } => causes.iter().collect(),
        }
    }
}

impl<E> From<RetryExhaustedError<E>> for RetryError<E> {
    fn from(value: RetryExhaustedError<E>) -> Self {
        RetryError::Exhausted(value)
    }
}

impl<E> fmt::Display for RetryError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Rejected { error, .. } => write!(f, "{error}"),
            RetryError::Exhausted(exhausted) => write!(f, "{exhausted}"),
            RetryError::Cancelled { attempts, .. } => {
                write!(f, "retry cancelled after {attempts} failed attempts")
            }
        }
    }
}

impl<E> Error for RetryError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Rejected { error, .. } => error.source(),
            RetryError::Exhausted(exhausted) => exhausted.source(),
            RetryError::Cancelled { causes, .. } => {
                causes.last().map(|cause| cause as &(dyn Error + 'static))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_exhausted_display_and_source() {
        let err = RetryExhaustedError::new(
            2,
            vec![io::Error::other("first"), io::Error::other("second")],
        );

        assert_eq!(err.to_string(), "retry exhausted after 2 attempts: second");
        assert_eq!(err.source().unwrap().to_string(), "second");
        assert_eq!(err.last_cause().unwrap().to_string(), "second");
    }

    #[test]
    fn test_rejected_is_transparent() {
        let err: RetryError<io::Error> = RetryError::Rejected {
            error: io::Error::new(io::ErrorKind::InvalidInput, "bad input"),
            suppressed: Vec::new(),
        };

        assert!(err.is_rejected());
        assert_eq!(err.to_string(), "bad input");
        assert_eq!(err.into_rejected().unwrap().kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_history_is_chronological() {
        let err: RetryError<&str> = RetryError::Rejected {
            error: "fatal",
            suppressed: vec!["timeout", "reset"],
        };

        assert_eq!(err.history(), vec![&"timeout", &"reset", &"fatal"]);
    }

    #[test]
    fn test_configuration_error_messages() {
        assert_eq!(
            ConfigurationError::PolicyNotFound("payments".into()).to_string(),
            "retry policy 'payments' is not registered"
        );
        assert_eq!(
            ConfigurationError::InvalidMaxAttempts {
                policy: "payments".into(),
                value: 0
            }
            .to_string(),
            "retry policy 'payments': max_attempts must be at least 1 (got 0)"
        );
    }
}
