//! Model-checked transaction harness.
//!
//! Applies generated operations to a real transaction and to a plain map
//! at the same time so tests can compare what the transaction sees with
//! what it should see.

use crate::fixtures::{as_text, TestEngine, DEFAULT_COLLECTION};
use crate::generators::TxnOperation;
use mctx_core::{AccessMode, CoreResult, Transaction, TransactionHints};
use std::collections::BTreeMap;

/// Expected visible state of one collection: key to value, `None` if deleted.
pub type Model = BTreeMap<String, Option<String>>;

/// A running transaction paired with its expected view.
pub struct IntegrationHarness {
    /// The fixture the transaction runs on.
    pub fixture: TestEngine,
    /// The transaction under test.
    pub txn: Transaction,
    model: Model,
}

impl IntegrationHarness {
    /// Begins a write transaction on [`DEFAULT_COLLECTION`] of a fresh fixture.
    pub fn new() -> CoreResult<Self> {
        Self::with_fixture(TestEngine::new())
    }

    /// Begins a write transaction on [`DEFAULT_COLLECTION`] of `fixture`.
    ///
    /// The model only covers keys written through the harness.
    pub fn with_fixture(fixture: TestEngine) -> CoreResult<Self> {
        let txn = fixture.manager.begin(
            TransactionHints::default(),
            &[(DEFAULT_COLLECTION, AccessMode::Write)],
        )?;
        Ok(Self {
            fixture,
            txn,
            model: Model::new(),
        })
    }

    /// Applies `op` to the transaction and the model.
    pub fn apply(&mut self, op: &TxnOperation) -> CoreResult<()> {
        match op {
            TxnOperation::Put { key, value } => {
                self.txn
                    .put(DEFAULT_COLLECTION, key.clone(), value.clone())?;
                self.model.insert(key.clone(), Some(value.clone()));
            }
            TxnOperation::Delete { key } => {
                self.txn.delete(DEFAULT_COLLECTION, key.clone())?;
                self.model.insert(key.clone(), None);
            }
            TxnOperation::GetForUpdate { key } => {
                self.txn.get_for_update(DEFAULT_COLLECTION, key.as_bytes())?;
            }
            TxnOperation::UndoGetForUpdate { key } => {
                self.txn
                    .undo_get_for_update(DEFAULT_COLLECTION, key.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Applies every operation in order.
    pub fn apply_all(&mut self, ops: &[TxnOperation]) -> CoreResult<()> {
        ops.iter().try_for_each(|op| self.apply(op))
    }

    /// The expected view so far.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Replaces the expected view, e.g. to restore it after a rollback.
    pub fn restore_model(&mut self, model: Model) {
        self.model = model;
    }

    /// Reads every key in `keys` through the transaction.
    pub fn observe<'a>(
        &mut self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> CoreResult<BTreeMap<String, Option<String>>> {
        let mut view = BTreeMap::new();
        for key in keys {
            let value = self.txn.get(DEFAULT_COLLECTION, key.as_bytes())?;
            view.insert(key.to_string(), as_text(value));
        }
        Ok(view)
    }

    /// Asserts that the transaction sees exactly what the model expects for
    /// every key the model knows.
    pub fn verify(&mut self) -> CoreResult<()> {
        let keys: Vec<String> = self.model.keys().cloned().collect();
        let view = self.observe(keys.iter().map(String::as_str))?;
        assert_eq!(&view, &self.model, "transaction view differs from model");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_tracks_writes() {
        let mut harness = IntegrationHarness::new().unwrap();
        harness
            .apply_all(&[
                TxnOperation::Put {
                    key: "a".into(),
                    value: "1".into(),
                },
                TxnOperation::Delete { key: "b".into() },
                TxnOperation::GetForUpdate { key: "c".into() },
            ])
            .unwrap();

        assert_eq!(harness.model().len(), 2);
        harness.verify().unwrap();
        assert_eq!(harness.txn.num_keys(), 3);
    }
}
