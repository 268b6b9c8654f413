//! Policy configuration.
//!
//! [`RetryPolicyConfig`] is the resolved, immutable form of one named policy.
//! [`RetrySettings`] is the deserializable surface a host application fills
//! from whatever configuration source it uses; predicate names in it are
//! resolved against a [`PredicateRegistry`].

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::backoff::BackoffPolicy;
use crate::error::ConfigurationError;
use crate::predicate::{AlwaysRetry, PredicateRegistry, RetryPredicate};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Immutable parameters of one named retry policy.
#[derive(Clone)]
pub struct RetryPolicyConfig {
    name: String,
    max_attempts: u32,
    backoff: BackoffPolicy,
    predicate: Arc<dyn RetryPredicate>,
}

impl RetryPolicyConfig {
    /// Start building a policy named `name`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use retry_machines::{ConstantBackoff, ErrorTypePredicate, RetryPolicyConfig};
    ///
    /// let config = RetryPolicyConfig::builder("payments")
    ///     .max_attempts(3)
    ///     .backoff(ConstantBackoff::new().delay_ms(10))
    ///     .predicate(ErrorTypePredicate::<std::io::Error>::new("io"))
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(config.max_attempts(), 3);
    /// ```
    pub fn builder(name: impl Into<String>) -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            name: name.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
            predicate: Arc::new(AlwaysRetry),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of attempts allowed per invocation, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn predicate(&self) -> &dyn RetryPredicate {
        self.predicate.as_ref()
    }

    pub fn is_retryable(&self, error: &(dyn Error + 'static)) -> bool {
        self.predicate.test(error)
    }
}

impl fmt::Debug for RetryPolicyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicyConfig")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("predicate", &self.predicate.name())
            .finish()
    }
}

/// Builder for [`RetryPolicyConfig`].
pub struct RetryPolicyBuilder {
    name: String,
    max_attempts: u32,
    backoff: BackoffPolicy,
    predicate: Arc<dyn RetryPredicate>,
}

impl RetryPolicyBuilder {
    /// Set the total number of attempts (must be at least 1)
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the backoff shape
    pub fn backoff(mut self, backoff: impl Into<BackoffPolicy>) -> Self {
        self.backoff = backoff.into();
        self
    }

    /// Set the retryable-error predicate
    pub fn predicate<P>(self, predicate: P) -> Self
    where
        P: RetryPredicate + 'static,
    {
        self.shared_predicate(Arc::new(predicate))
    }

    pub fn shared_predicate(mut self, predicate: Arc<dyn RetryPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    /// Validate and freeze the policy.
    pub fn build(self) -> Result<RetryPolicyConfig, ConfigurationError> {
        if self.name.is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        if self.max_attempts == 0 {
            return Err(ConfigurationError::InvalidMaxAttempts {
                policy: self.name,
                value: self.max_attempts,
            });
        }
        if let Err(reason) = self.backoff.validate() {
            return Err(ConfigurationError::InvalidBackoff {
                policy: self.name,
                reason,
            });
        }

        Ok(RetryPolicyConfig {
            name: self.name,
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            predicate: self.predicate,
        })
    }
}

/// Deserializable set of named policies.
///
/// ```toml
/// [policies.payments]
/// max_attempts = 3
/// predicate = "io"
///
/// [policies.payments.backoff]
/// kind = "constant"
/// delay_ms = 10
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrySettings {
    #[serde(default)]
    pub policies: BTreeMap<String, PolicySettings>,
}

/// Settings of one policy; the policy's name is its key in [`RetrySettings`].
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// Predicate name; `None` retries every failure.
    #[serde(default)]
    pub predicate: Option<String>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
            predicate: None,
        }
    }
}

impl PolicySettings {
    /// Resolve these settings into a policy named `name`.
    pub fn resolve(
        &self,
        name: &str,
        predicates: &PredicateRegistry,
    ) -> Result<RetryPolicyConfig, ConfigurationError> {
        let mut builder = RetryPolicyConfig::builder(name)
            .max_attempts(self.max_attempts)
            .backoff(self.backoff);

        if let Some(predicate_name) = &self.predicate {
            let predicate = predicates.get(predicate_name).ok_or_else(|| {
                ConfigurationError::PredicateNotFound {
                    policy: name.to_string(),
                    predicate: predicate_name.clone(),
                }
            })?;
            builder = builder.shared_predicate(predicate);
        }

        builder.build()
    }
}

impl RetrySettings {
    /// Resolve every policy, failing on the first invalid one.
    pub fn resolve(
        &self,
        predicates: &PredicateRegistry,
    ) -> Result<Vec<RetryPolicyConfig>, ConfigurationError> {
        self.policies
            .iter()
            .map(|(name, settings)| settings.resolve(name, predicates))
            .collect()
    }
}
