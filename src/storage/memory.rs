use parking_lot::{Mutex, RwLock};

use crate::core::errors::StoreError;
use crate::core::record::{Record, RecordKind, RecordPattern, RecordSet};
use crate::query::{self, BindingSet, TupleExpr};
use crate::storage::Store;

#[derive(Debug, Default)]
struct Partitions {
    explicit: RecordSet,
    inferred: RecordSet,
}

impl Partitions {
    fn set_mut(&mut self, kind: RecordKind) -> &mut RecordSet {
        match kind {
            RecordKind::Explicit => &mut self.explicit,
            RecordKind::Inferred => &mut self.inferred,
        }
    }

    fn set(&self, kind: RecordKind) -> &RecordSet {
        match kind {
            RecordKind::Explicit => &self.explicit,
            RecordKind::Inferred => &self.inferred,
        }
    }
}

#[derive(Debug)]
enum UndoEntry {
    Inserted(RecordKind, Record),
    Deleted(RecordKind, Record),
}

/// In-memory store with undo-log store transactions.
///
/// Writes outside a store transaction apply immediately and cannot be undone.
/// Only one store transaction may be open at a time; the transaction layer
/// serializes flushes, so a second `begin_store_txn` is a caller bug and
/// reported as an error.
#[derive(Debug, Default)]
pub struct MemoryStore {
    undo: Mutex<Option<Vec<UndoEntry>>>,
    data: RwLock<Partitions>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        let store = Self::new();
        store.data.write().explicit.extend(records);
        store
    }

    pub fn len(&self, kind: RecordKind) -> usize {
        self.data.read().set(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        let data = self.data.read();
        data.explicit.is_empty() && data.inferred.is_empty()
    }

    /// All records of one stream, in order.
    pub fn records(&self, kind: RecordKind) -> Vec<Record> {
        self.data.read().set(kind).iter().cloned().collect()
    }

    pub fn in_store_txn(&self) -> bool {
        self.undo.lock().is_some()
    }
}

impl Store for MemoryStore {
    fn match_records(
        &self,
        pattern: &RecordPattern,
        include_inferred: bool,
    ) -> Result<Vec<Record>, StoreError> {
        let data = self.data.read();
        let mut out: RecordSet = pattern.filter(&data.explicit).cloned().collect();
        if include_inferred {
            out.extend(pattern.filter(&data.inferred).cloned());
        }
        Ok(out.into_iter().collect())
    }

    fn evaluate(
        &self,
        expr: &TupleExpr,
        bindings: &BindingSet,
        include_inferred: bool,
    ) -> Result<Vec<BindingSet>, StoreError> {
        query::evaluate(self, expr, bindings, include_inferred)
    }

    fn contains(&self, record: &Record, kind: RecordKind) -> Result<bool, StoreError> {
        Ok(self.data.read().set(kind).contains(record))
    }

    fn insert(&self, records: &[Record], kind: RecordKind) -> Result<(), StoreError> {
        let mut undo = self.undo.lock();
        let mut data = self.data.write();
        for record in records {
            if data.set_mut(kind).insert(record.clone()) {
                if let Some(log) = undo.as_mut() {
                    log.push(UndoEntry::Inserted(kind, record.clone()));
                }
            }
        }
        Ok(())
    }

    fn delete(&self, records: &[Record], kind: RecordKind) -> Result<(), StoreError> {
        let mut undo = self.undo.lock();
        let mut data = self.data.write();
        for record in records {
            if data.set_mut(kind).remove(record) {
                if let Some(log) = undo.as_mut() {
                    log.push(UndoEntry::Deleted(kind, record.clone()));
                }
            }
        }
        Ok(())
    }

    fn begin_store_txn(&self) -> Result<(), StoreError> {
        let mut undo = self.undo.lock();
        if undo.is_some() {
            return Err(StoreError("store transaction already open".into()));
        }
        *undo = Some(Vec::new());
        Ok(())
    }

    fn commit_store_txn(&self) -> Result<(), StoreError> {
        match self.undo.lock().take() {
            Some(_) => Ok(()),
            None => Err(StoreError("no open store transaction to commit".into())),
        }
    }

    fn rollback_store_txn(&self) -> Result<(), StoreError> {
        let mut undo = self.undo.lock();
        let log = undo
            .take()
            .ok_or_else(|| StoreError("no open store transaction to roll back".into()))?;
        let mut data = self.data.write();
        for entry in log.into_iter().rev() {
            match entry {
                UndoEntry::Inserted(kind, record) => {
                    data.set_mut(kind).remove(&record);
                }
                UndoEntry::Deleted(kind, record) => {
                    data.set_mut(kind).insert(record);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Term;

    fn rec(s: &str, o: &str) -> Record {
        Record::new(Term::iri(s), Term::iri("p"), Term::iri(o))
    }

    #[test]
    fn rollback_restores_pre_transaction_state() {
        let store = MemoryStore::with_records([rec("a", "1"), rec("b", "2")]);
        store.begin_store_txn().unwrap();
        store.delete(&[rec("a", "1")], RecordKind::Explicit).unwrap();
        store.insert(&[rec("c", "3")], RecordKind::Explicit).unwrap();
        store.insert(&[rec("d", "4")], RecordKind::Inferred).unwrap();
        store.rollback_store_txn().unwrap();

        assert_eq!(store.records(RecordKind::Explicit), vec![rec("a", "1"), rec("b", "2")]);
        assert_eq!(store.len(RecordKind::Inferred), 0);
        assert!(!store.in_store_txn());
    }

    #[test]
    fn rollback_ignores_no_op_writes() {
        let store = MemoryStore::with_records([rec("a", "1")]);
        store.begin_store_txn().unwrap();
        // already present: must not be removed by the rollback
        store.insert(&[rec("a", "1")], RecordKind::Explicit).unwrap();
        store.rollback_store_txn().unwrap();
        assert!(store.contains(&rec("a", "1"), RecordKind::Explicit).unwrap());
    }

    #[test]
    fn nested_store_txn_is_rejected() {
        let store = MemoryStore::new();
        store.begin_store_txn().unwrap();
        assert!(store.begin_store_txn().is_err());
        store.commit_store_txn().unwrap();
        assert!(store.commit_store_txn().is_err());
    }

    #[test]
    fn inferred_records_only_match_when_requested() {
        let store = MemoryStore::new();
        store.insert(&[rec("a", "1")], RecordKind::Inferred).unwrap();
        let any = RecordPattern::any();
        assert!(store.match_records(&any, false).unwrap().is_empty());
        assert_eq!(store.match_records(&any, true).unwrap().len(), 1);
    }
}
