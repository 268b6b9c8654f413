//! Named retrier registry.
//!
//! A [`RetrierManager`] is built once from resolved policy configuration and
//! never mutated afterwards, so lookups need no locking. One manager can be
//! installed as the process-wide instance and reached through [`retrier`].

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::config::{RetryPolicyConfig, RetrySettings};
use crate::error::ConfigurationError;
use crate::predicate::PredicateRegistry;
use crate::retrier::Retrier;

#[derive(Debug)]
struct Entry {
    config: Arc<RetryPolicyConfig>,
    retrier: OnceLock<Retrier>,
}

/// Registry mapping policy names to [`Retrier`]s.
///
/// Retriers are constructed on first lookup and cached.
///
/// # Example
///
/// ```rust
/// use retry_machines::{RetrierManager, RetryPolicyConfig};
///
/// let manager = RetrierManager::new([
///     RetryPolicyConfig::builder("payments").max_attempts(5).build().unwrap(),
/// ])
/// .unwrap();
///
/// assert_eq!(manager.get("payments").unwrap().max_attempts(), 5);
/// assert!(manager.get("missing").is_err());
/// ```
#[derive(Debug, Default)]
pub struct RetrierManager {
    entries: HashMap<String, Entry>,
}

impl RetrierManager {
    /// Build a manager from resolved policies. Names must be unique.
    pub fn new<I>(policies: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = RetryPolicyConfig>,
    {
        let mut entries = HashMap::new();

        for config in policies {
            let name = config.name().to_string();
            if entries.contains_key(&name) {
                return Err(ConfigurationError::DuplicatePolicy(name));
            }
            entries.insert(
                name,
                Entry {
                    config: Arc::new(config),
                    retrier: OnceLock::new(),
                },
            );
        }

        tracing::debug!(policies = entries.len(), "retrier manager initialized");
        Ok(Self { entries })
    }

    /// Build a manager from settings, resolving predicate names in `predicates`.
    pub fn from_settings(
        settings: &RetrySettings,
        predicates: &PredicateRegistry,
    ) -> Result<Self, ConfigurationError> {
        Self::new(settings.resolve(predicates)?)
    }

    /// Look up the retrier for `name`.
    ///
    /// Fails when the name is empty or no policy is registered under it.
    pub fn get(&self, name: &str) -> Result<Retrier, ConfigurationError> {
        if name.is_empty() {
            return Err(ConfigurationError::EmptyName);
        }

        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ConfigurationError::PolicyNotFound(name.to_string()))?;

        Ok(entry
            .retrier
            .get_or_init(|| Retrier::from_shared(Arc::clone(&entry.config)))
            .clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names of all registered policies, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Install this manager as the process-wide instance.
    ///
    /// Only the first install succeeds; the instance lives for the rest of the
    /// process.
    pub fn install_global(self) -> Result<&'static RetrierManager, ConfigurationError> {
        let mut installed = false;
        let manager = GLOBAL_MANAGER.get_or_init(|| {
            installed = true;
            self
        });

        if installed {
            Ok(manager)
        } else {
            Err(ConfigurationError::GlobalAlreadyInstalled)
        }
    }

    /// The process-wide instance, if one has been installed.
    pub fn global() -> Option<&'static RetrierManager> {
        GLOBAL_MANAGER.get()
    }
}

static GLOBAL_MANAGER: OnceLock<RetrierManager> = OnceLock::new();

/// Look up `name` in the process-wide manager.
pub fn retrier(name: &str) -> Result<Retrier, ConfigurationError> {
    RetrierManager::global()
        .ok_or(ConfigurationError::GlobalNotInstalled)?
        .get(name)
}
