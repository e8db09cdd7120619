//! Engine configuration.

/// Configuration for an [`InMemoryEngine`](crate::InMemoryEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Distinct keys a mutable write-history table holds before it is sealed.
    pub memtable_capacity: usize,

    /// Sealed history tables retained for conflict checks.
    ///
    /// Older tables are evicted; conflict checks that would need them fail
    /// with `HistoryUnavailable`.
    pub max_retained_memtables: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memtable_capacity: 4096,
            max_retained_memtables: 4,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mutable history table capacity (at least 1).
    #[must_use]
    pub const fn memtable_capacity(mut self, keys: usize) -> Self {
        self.memtable_capacity = if keys == 0 { 1 } else { keys };
        self
    }

    /// Sets how many sealed history tables are retained.
    #[must_use]
    pub const fn max_retained_memtables(mut self, count: usize) -> Self {
        self.max_retained_memtables = count;
        self
    }
}
