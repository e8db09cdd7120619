//! Property-based test generators using proptest.
//!
//! Keys are drawn from small alphabets so generated transactions overlap
//! often enough to exercise conflicts and savepoint truncation.

use proptest::prelude::*;

/// One operation inside a generated transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOperation {
    /// Write a value.
    Put {
        /// Key
        key: String,
        /// Value
        value: String,
    },
    /// Remove a key.
    Delete {
        /// Key
        key: String,
    },
    /// Read a key and track it for validation.
    GetForUpdate {
        /// Key
        key: String,
    },
    /// Stop tracking the latest read-for-update of a key.
    UndoGetForUpdate {
        /// Key
        key: String,
    },
}

impl TxnOperation {
    /// The key the operation touches.
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. }
            | Self::Delete { key }
            | Self::GetForUpdate { key }
            | Self::UndoGetForUpdate { key } => key,
        }
    }
}

/// Strategy for keys from a small shared key space.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f]{1,2}").expect("Invalid regex")
}

/// Strategy for short printable values.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{0,8}").expect("Invalid regex")
}

/// Strategy for a single transaction operation.
pub fn txn_operation_strategy() -> impl Strategy<Value = TxnOperation> {
    prop_oneof![
        3 => (key_strategy(), value_strategy())
            .prop_map(|(key, value)| TxnOperation::Put { key, value }),
        1 => key_strategy().prop_map(|key| TxnOperation::Delete { key }),
        2 => key_strategy().prop_map(|key| TxnOperation::GetForUpdate { key }),
        1 => key_strategy().prop_map(|key| TxnOperation::UndoGetForUpdate { key }),
    ]
}

/// Strategy for a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<TxnOperation>> {
    prop::collection::vec(txn_operation_strategy(), min_ops..max_ops)
}

/// Strategy for two operation sequences whose key sets are disjoint.
///
/// The first sequence uses keys prefixed `l`, the second keys prefixed `r`.
pub fn disjoint_sequences_strategy(
    max_ops: usize,
) -> impl Strategy<Value = (Vec<TxnOperation>, Vec<TxnOperation>)> {
    let side = move |prefix: &'static str| {
        operation_sequence_strategy(1, max_ops).prop_map(move |ops| {
            ops.into_iter()
                .map(|op| prefixed(op, prefix))
                .collect::<Vec<_>>()
        })
    };
    (side("l"), side("r"))
}

fn prefixed(op: TxnOperation, prefix: &str) -> TxnOperation {
    match op {
        TxnOperation::Put { key, value } => TxnOperation::Put {
            key: format!("{prefix}{key}"),
            value,
        },
        TxnOperation::Delete { key } => TxnOperation::Delete {
            key: format!("{prefix}{key}"),
        },
        TxnOperation::GetForUpdate { key } => TxnOperation::GetForUpdate {
            key: format!("{prefix}{key}"),
        },
        TxnOperation::UndoGetForUpdate { key } => TxnOperation::UndoGetForUpdate {
            key: format!("{prefix}{key}"),
        },
    }
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
