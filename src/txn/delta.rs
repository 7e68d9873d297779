use crate::core::errors::StoreError;
use crate::core::record::{Record, RecordKind, RecordPattern, RecordSet};
use crate::storage::Store;

/// Pending changes of one transaction to one record stream.
///
/// `added` and `removed` are disjoint: staging the opposite operation on a
/// record cancels the earlier one.
#[derive(Debug, Clone)]
pub struct Delta {
    kind: RecordKind,
    added: RecordSet,
    removed: RecordSet,
}

impl Delta {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            added: RecordSet::new(),
            removed: RecordSet::new(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn added(&self) -> &RecordSet {
        &self.added
    }

    pub fn removed(&self) -> &RecordSet {
        &self.removed
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Total number of staged records.
    pub fn size(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.removed.clear();
    }

    pub fn stage_add(&mut self, record: Record) {
        if !self.removed.remove(&record) {
            self.added.insert(record);
        }
    }

    /// Stages removal of everything `pattern` matches: staged adds are
    /// dropped, and records currently in the store are marked removed.
    /// Returns the number of records affected.
    pub fn stage_remove<S>(
        &mut self,
        pattern: &RecordPattern,
        store: &S,
    ) -> Result<usize, StoreError>
    where
        S: Store + ?Sized,
    {
        let before = self.added.len();
        self.added.retain(|record| !pattern.matches(record));
        let mut affected = before - self.added.len();

        for record in resolve_matches(store, pattern, self.kind)? {
            if self.removed.insert(record) {
                affected += 1;
            }
        }
        Ok(affected)
    }

    /// Applies this delta to `records`: hides removed records and adds the
    /// staged records `pattern` matches.
    pub fn overlay(&self, pattern: &RecordPattern, records: &mut RecordSet) {
        records.retain(|record| !self.removed.contains(record));
        records.extend(pattern.filter(&self.added).cloned());
    }

    /// Writes `removed` then `added` to the store and clears both on success.
    /// On error the delta is left intact.
    pub fn apply_to<S>(&mut self, store: &S) -> Result<(), StoreError>
    where
        S: Store + ?Sized,
    {
        self.write_to(store)?;
        self.clear();
        Ok(())
    }

    /// [`Delta::apply_to`] without clearing, for callers flushing several
    /// deltas as one unit.
    pub fn write_to<S>(&self, store: &S) -> Result<(), StoreError>
    where
        S: Store + ?Sized,
    {
        if !self.removed.is_empty() {
            let removed: Vec<Record> = self.removed.iter().cloned().collect();
            store.delete(&removed, self.kind)?;
        }
        if !self.added.is_empty() {
            let added: Vec<Record> = self.added.iter().cloned().collect();
            store.insert(&added, self.kind)?;
        }
        Ok(())
    }

    /// Staged adds not yet in the store, and staged removals still in it.
    pub fn effective_changes<S>(
        &self,
        store: &S,
    ) -> Result<(Vec<Record>, Vec<Record>), StoreError>
    where
        S: Store + ?Sized,
    {
        let mut added = Vec::new();
        for record in &self.added {
            if !store.contains(record, self.kind)? {
                added.push(record.clone());
            }
        }
        let mut removed = Vec::new();
        for record in &self.removed {
            if store.contains(record, self.kind)? {
                removed.push(record.clone());
            }
        }
        Ok((added, removed))
    }
}

/// Records a read over both streams must hide. A removal staged on one
/// stream only hides a record the other stream does not still hold.
pub(crate) fn hidden_records<S>(
    explicit: &Delta,
    inferred: &Delta,
    store: &S,
) -> Result<RecordSet, StoreError>
where
    S: Store + ?Sized,
{
    let mut hidden = RecordSet::new();
    for (delta, other) in [(explicit, inferred), (inferred, explicit)] {
        for record in &delta.removed {
            if other.removed.contains(record) || !store.contains(record, other.kind)? {
                hidden.insert(record.clone());
            }
        }
    }
    Ok(hidden)
}

/// Records of stream `kind` in the store that `pattern` matches.
pub(crate) fn resolve_matches<S>(
    store: &S,
    pattern: &RecordPattern,
    kind: RecordKind,
) -> Result<Vec<Record>, StoreError>
where
    S: Store + ?Sized,
{
    match kind {
        RecordKind::Explicit => store.match_records(pattern, false),
        RecordKind::Inferred => {
            let mut out = Vec::new();
            for record in store.match_records(pattern, true)? {
                if store.contains(&record, RecordKind::Inferred)? {
                    out.push(record);
                }
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Term;
    use crate::storage::MemoryStore;

    fn rec(s: &str, o: &str) -> Record {
        Record::new(Term::iri(s), Term::iri("likes"), Term::iri(o))
    }

    #[test]
    fn add_cancels_pending_removal() {
        let store = MemoryStore::with_records([rec("alice", "cats")]);
        let mut delta = Delta::new(RecordKind::Explicit);
        delta
            .stage_remove(&RecordPattern::exact(&rec("alice", "cats")), &store)
            .unwrap();
        assert_eq!(delta.removed().len(), 1);

        delta.stage_add(rec("alice", "cats"));
        assert!(delta.is_empty());
    }

    #[test]
    fn remove_drops_staged_adds_and_resolves_store_matches() {
        let store = MemoryStore::with_records([rec("alice", "cats"), rec("bob", "dogs")]);
        let mut delta = Delta::new(RecordKind::Explicit);
        delta.stage_add(rec("carol", "cats"));
        delta.stage_add(rec("dave", "fish"));

        let pattern = RecordPattern::any().object(Term::iri("cats"));
        let affected = delta.stage_remove(&pattern, &store).unwrap();

        assert_eq!(affected, 2);
        assert_eq!(delta.added().iter().collect::<Vec<_>>(), vec![&rec("dave", "fish")]);
        assert_eq!(delta.removed().iter().collect::<Vec<_>>(), vec![&rec("alice", "cats")]);
        assert_eq!(delta.size(), 2);
    }

    #[test]
    fn inferred_removal_ignores_explicit_records() {
        let store = MemoryStore::with_records([rec("alice", "cats")]);
        store.insert(&[rec("bob", "cats")], RecordKind::Inferred).unwrap();
        let mut delta = Delta::new(RecordKind::Inferred);
        delta.stage_remove(&RecordPattern::any(), &store).unwrap();
        assert_eq!(delta.removed().iter().collect::<Vec<_>>(), vec![&rec("bob", "cats")]);
    }

    #[test]
    fn removal_hides_only_records_gone_from_both_streams() {
        let store = MemoryStore::with_records([rec("alice", "cats"), rec("bob", "cats")]);
        store.insert(&[rec("alice", "cats")], RecordKind::Inferred).unwrap();
        let mut explicit = Delta::new(RecordKind::Explicit);
        explicit.stage_remove(&RecordPattern::any(), &store).unwrap();
        let mut inferred = Delta::new(RecordKind::Inferred);

        let hidden = hidden_records(&explicit, &inferred, &store).unwrap();
        assert_eq!(hidden.into_iter().collect::<Vec<_>>(), vec![rec("bob", "cats")]);

        inferred.stage_remove(&RecordPattern::any(), &store).unwrap();
        let hidden = hidden_records(&explicit, &inferred, &store).unwrap();
        assert_eq!(hidden.len(), 2);
    }

    #[test]
    fn apply_writes_and_clears() {
        let store = MemoryStore::with_records([rec("alice", "cats")]);
        let mut delta = Delta::new(RecordKind::Explicit);
        delta.stage_remove(&RecordPattern::any(), &store).unwrap();
        delta.stage_add(rec("bob", "dogs"));
        delta.apply_to(&store).unwrap();

        assert!(delta.is_empty());
        assert_eq!(store.records(RecordKind::Explicit), vec![rec("bob", "dogs")]);
    }

    #[test]
    fn effective_changes_skip_no_ops() {
        let store = MemoryStore::with_records([rec("alice", "cats")]);
        let mut delta = Delta::new(RecordKind::Explicit);
        delta.stage_add(rec("alice", "cats"));
        delta.stage_add(rec("bob", "dogs"));
        let (added, removed) = delta.effective_changes(&store).unwrap();
        assert_eq!(added, vec![rec("bob", "dogs")]);
        assert!(removed.is_empty());
    }
}
