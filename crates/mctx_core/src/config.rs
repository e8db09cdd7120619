//! Transaction engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by every transaction of a
/// [`TransactionManager`](crate::TransactionManager).
#[derive(Debug, Clone)]
pub struct Config {
    /// How long lock acquisition waits for a conflicting holder.
    ///
    /// `None` waits forever; `Some(Duration::ZERO)` fails immediately.
    pub lock_timeout: Option<Duration>,

    /// Pending operations that trigger an intermediate commit.
    pub intermediate_commit_count: usize,

    /// Pending payload bytes that trigger an intermediate commit.
    pub intermediate_commit_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_timeout: Some(Duration::from_secs(30)),
            intermediate_commit_count: 10_000,
            intermediate_commit_size: 16 * 1024 * 1024, // 16 MiB
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lock acquisition timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the operation count threshold for intermediate commits.
    #[must_use]
    pub const fn intermediate_commit_count(mut self, count: usize) -> Self {
        self.intermediate_commit_count = count;
        self
    }

    /// Sets the payload size threshold for intermediate commits.
    #[must_use]
    pub const fn intermediate_commit_size(mut self, bytes: usize) -> Self {
        self.intermediate_commit_size = bytes;
        self
    }
}

/// Behavioral flags fixed when a transaction is created.
///
/// Hints change how locking and commits are carried out, never what a
/// successful commit guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionHints {
    /// The transaction performs at most one write.
    pub single_operation: bool,

    /// Collections may be registered or upgraded on demand, also after begin.
    pub allow_implicit_collections: bool,

    /// Large transactions are committed piecewise once the configured
    /// thresholds are reached.
    pub intermediate_commits: bool,

    /// Native collection locks are not taken; the caller holds them.
    pub no_usage_lock: bool,
}

impl TransactionHints {
    /// Creates an empty hint set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            single_operation: false,
            allow_implicit_collections: false,
            intermediate_commits: false,
            no_usage_lock: false,
        }
    }

    /// Sets the single-operation hint.
    #[must_use]
    pub const fn single_operation(mut self, value: bool) -> Self {
        self.single_operation = value;
        self
    }

    /// Sets the implicit-collections hint.
    #[must_use]
    pub const fn allow_implicit_collections(mut self, value: bool) -> Self {
        self.allow_implicit_collections = value;
        self
    }

    /// Sets the intermediate-commits hint.
    #[must_use]
    pub const fn intermediate_commits(mut self, value: bool) -> Self {
        self.intermediate_commits = value;
        self
    }

    /// Sets the no-usage-lock hint.
    #[must_use]
    pub const fn no_usage_lock(mut self, value: bool) -> Self {
        self.no_usage_lock = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.lock_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.intermediate_commit_count, 10_000);
        assert_eq!(config.intermediate_commit_size, 16 * 1024 * 1024);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .lock_timeout(None)
            .intermediate_commit_count(8)
            .intermediate_commit_size(1024);

        assert_eq!(config.lock_timeout, None);
        assert_eq!(config.intermediate_commit_count, 8);
        assert_eq!(config.intermediate_commit_size, 1024);
    }

    #[test]
    fn hints_default_to_off() {
        let hints = TransactionHints::default();
        assert_eq!(hints, TransactionHints::new());
        assert!(!hints.single_operation);
        assert!(!hints.no_usage_lock);
    }

    #[test]
    fn hints_from_partial_json() {
        let hints: TransactionHints =
            serde_json::from_str(r#"{"intermediate_commits": true}"#).unwrap();
        assert!(hints.intermediate_commits);
        assert!(!hints.allow_implicit_collections);

        let unknown = serde_json::from_str::<TransactionHints>(r#"{"fast": true}"#);
        assert!(unknown.is_err());
    }
}
