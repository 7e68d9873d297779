use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::conflict::affects;
use super::coordinator::{
    ConflictMark, LockCoordinator, MembershipHold, PreparationHold, TxnSlot,
};
use super::delta::{hidden_records, resolve_matches, Delta};
use super::notify::{ChangeEvent, ChangeListener, ListenerId, ObserverList};
use super::trace::ReadOperation;
use super::{TxnId, TXN_NONE};
use crate::core::errors::{ConflictError, OptiQuadError, StoreError};
use crate::core::lock_stats::{begin_lock_hold, record_lock_wait, LockStatKind};
use crate::core::record::{Record, RecordKind, RecordPattern, RecordSet, Term};
use crate::query::{basic_nodes, BindingSet, DeltaMerger, TupleExpr};
use crate::storage::Store;

/// Staged records after which a transaction tries to become exclusive.
pub const LARGE_BLOCK: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Inactive,
    Active,
    /// Sole member; writes go straight to the store inside a store-level
    /// transaction opened at escalation.
    Exclusive,
    /// Validated, holding the exclusive preparation hold.
    Prepared { exclusive: bool },
}

/// When a buffering transaction tries to become exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// Attempt escalation each time the staged size crosses a multiple of
    /// this. Zero disables escalation.
    pub threshold: usize,
    /// Escalate even with per-record listeners registered. Events are then
    /// computed on each direct write instead of at flush.
    pub with_listeners: bool,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            threshold: LARGE_BLOCK,
            with_listeners: false,
        }
    }
}

/// How strictly commits are checked against concurrent writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    /// A transaction whose reads were invalidated fails to commit, even when
    /// it wrote nothing.
    #[default]
    Serializable,
    /// Reads are still recorded, but a transaction that wrote nothing
    /// commits even when marked.
    Snapshot,
}

enum WriteOp {
    Add(Record),
    Remove(RecordPattern),
}

#[derive(Debug, Default, Clone, Copy)]
struct ChangeSummary {
    added: bool,
    removed: bool,
}

/// One transaction's handle on the shared store.
///
/// Buffered reads see the store through this transaction's own pending
/// changes and are recorded so other transactions' commits can be checked
/// against them. Nothing reaches the store before commit, unless the
/// transaction escalates to exclusive mode.
pub struct Transaction {
    store: Arc<dyn Store>,
    coordinator: Arc<LockCoordinator>,
    policy: EscalationPolicy,
    isolation: IsolationLevel,
    store_listeners: Arc<ObserverList>,
    listeners: ObserverList,
    state: TxnState,
    membership: Option<MembershipHold>,
    preparation: Option<PreparationHold>,
    explicit: Delta,
    inferred: Delta,
    /// Events for changes already written while exclusive.
    pending_events: Vec<ChangeEvent>,
    written: ChangeSummary,
}

impl Transaction {
    pub fn new(
        store: Arc<dyn Store>,
        coordinator: Arc<LockCoordinator>,
        policy: EscalationPolicy,
        store_listeners: Arc<ObserverList>,
    ) -> Self {
        Self {
            store,
            coordinator,
            policy,
            isolation: IsolationLevel::default(),
            store_listeners,
            listeners: ObserverList::new(),
            state: TxnState::Inactive,
            membership: None,
            preparation: None,
            explicit: Delta::new(RecordKind::Explicit),
            inferred: Delta::new(RecordKind::Inferred),
            pending_events: Vec::new(),
            written: ChangeSummary::default(),
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Id of the current cycle, `TXN_NONE` while inactive.
    pub fn id(&self) -> TxnId {
        self.membership.as_ref().map_or(TXN_NONE, MembershipHold::id)
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != TxnState::Inactive
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(
            self.state,
            TxnState::Exclusive | TxnState::Prepared { exclusive: true }
        )
    }

    /// Pending explicit changes.
    pub fn delta(&self) -> &Delta {
        &self.explicit
    }

    pub fn inferred_delta(&self) -> &Delta {
        &self.inferred
    }

    /// Number of recorded reads awaiting validation.
    pub fn trace_len(&self) -> usize {
        self.slot().map_or(0, TxnSlot::trace_len)
    }

    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn begin(&mut self) -> Result<(), OptiQuadError> {
        if self.state != TxnState::Inactive {
            return Err(OptiQuadError::TransactionAlreadyActive);
        }
        let hold = self.coordinator.begin();
        debug!(txn_id = hold.id(), "begin");
        self.membership = Some(hold);
        self.explicit.clear();
        self.inferred.clear();
        self.pending_events.clear();
        self.written = ChangeSummary::default();
        self.state = TxnState::Active;
        Ok(())
    }

    pub fn add(&mut self, record: Record) -> Result<(), OptiQuadError> {
        self.write(RecordKind::Explicit, WriteOp::Add(record)).map(|_| ())
    }

    pub fn add_inferred(&mut self, record: Record) -> Result<(), OptiQuadError> {
        self.write(RecordKind::Inferred, WriteOp::Add(record)).map(|_| ())
    }

    /// Removes every explicit record `pattern` matches, as seen by this
    /// transaction. Returns the number of records affected.
    pub fn remove(&mut self, pattern: &RecordPattern) -> Result<usize, OptiQuadError> {
        self.write(RecordKind::Explicit, WriteOp::Remove(pattern.clone()))
    }

    pub fn remove_inferred(&mut self, pattern: &RecordPattern) -> Result<usize, OptiQuadError> {
        self.write(RecordKind::Inferred, WriteOp::Remove(pattern.clone()))
    }

    /// Removes every explicit record in `contexts` (`None` is the default
    /// context), or every explicit record when `contexts` is empty.
    pub fn clear(&mut self, contexts: &[Option<Term>]) -> Result<usize, OptiQuadError> {
        let pattern = RecordPattern {
            contexts: contexts.to_vec(),
            ..RecordPattern::any()
        };
        self.remove(&pattern)
    }

    /// Records matching `pattern`, including this transaction's own pending
    /// changes.
    pub fn match_records(
        &self,
        pattern: &RecordPattern,
        include_inferred: bool,
    ) -> Result<Vec<Record>, OptiQuadError> {
        if self.require_open("read")? {
            return Ok(self.store.match_records(pattern, include_inferred)?);
        }
        let _read = self.coordinator.read_hold();
        let expr = TupleExpr::from_record_pattern(pattern);
        let view = self
            .overlay(&expr, &BindingSet::new(), include_inferred)?
            .unwrap_or(expr);
        self.trace(view, BindingSet::new(), include_inferred);

        // Each delta only hides records of its own stream.
        let mut records: RecordSet = self
            .store
            .match_records(pattern, false)?
            .into_iter()
            .collect();
        self.explicit.overlay(pattern, &mut records);
        if include_inferred {
            let mut inferred: RecordSet =
                resolve_matches(&*self.store, pattern, RecordKind::Inferred)?
                    .into_iter()
                    .collect();
            self.inferred.overlay(pattern, &mut inferred);
            records.extend(inferred);
        }
        Ok(records.into_iter().collect())
    }

    pub fn count(
        &self,
        pattern: &RecordPattern,
        include_inferred: bool,
    ) -> Result<usize, OptiQuadError> {
        Ok(self.match_records(pattern, include_inferred)?.len())
    }

    /// Evaluates `expr` as this transaction sees the store.
    pub fn evaluate(
        &self,
        expr: &TupleExpr,
        bindings: &BindingSet,
        include_inferred: bool,
    ) -> Result<Vec<BindingSet>, OptiQuadError> {
        if self.require_open("evaluate")? {
            return Ok(self.store.evaluate(expr, bindings, include_inferred)?);
        }
        let _read = self.coordinator.read_hold();
        let merged = self.overlay(expr, bindings, include_inferred)?;
        let view = merged.as_ref().unwrap_or(expr);
        // The recorded read keeps this transaction's own changes, so a
        // result that only exists because of them is still checked.
        for node in basic_nodes(view) {
            self.trace(node, bindings.clone(), include_inferred);
        }
        Ok(self.store.evaluate(view, bindings, include_inferred)?)
    }

    /// `expr` rewritten to see this transaction's pending changes, or `None`
    /// when none of them can match it.
    fn overlay(
        &self,
        expr: &TupleExpr,
        bindings: &BindingSet,
        include_inferred: bool,
    ) -> Result<Option<TupleExpr>, StoreError> {
        let hidden: RecordSet;
        // Staged adds are also subtracted so records already in the store
        // are not produced twice.
        let mut merger = DeltaMerger::new()
            .union_with(self.explicit.added())
            .subtract(self.explicit.added());
        if include_inferred {
            hidden = hidden_records(&self.explicit, &self.inferred, &*self.store)?;
            merger = merger
                .union_with(self.inferred.added())
                .subtract(self.inferred.added())
                .subtract(&hidden);
        } else {
            merger = merger.subtract(self.explicit.removed());
        }
        Ok(merger.merge(expr, bindings))
    }

    /// Validates this transaction's pending changes against every other
    /// active transaction's recorded reads, marking those it invalidates.
    ///
    /// Keeps the exclusive preparation hold until commit or rollback. Fails
    /// with a conflict, after rolling back, if this transaction was itself
    /// marked, unless it wrote nothing and runs under
    /// [`IsolationLevel::Snapshot`].
    pub fn prepare(&mut self) -> Result<(), OptiQuadError> {
        let exclusive = self.require_open("prepare")?;
        let id = self.id();
        self.preparation = Some(self.coordinator.prepare_hold(id));

        let read_only = self.explicit.is_empty() && self.inferred.is_empty() && !exclusive;
        let mark = self.slot().and_then(TxnSlot::take_conflict);
        if let Some(mark) = mark {
            if read_only && self.isolation == IsolationLevel::Snapshot {
                debug!(txn_id = id, by = mark.by, "conflict ignored for read-only snapshot");
            } else {
                return Err(self.fail_conflicted(mark));
            }
        }

        if !exclusive && !read_only {
            let store = &*self.store;
            let (explicit, inferred) = (&self.explicit, &self.inferred);
            let result = self
                .coordinator
                .validate(id, |op| affects(explicit, inferred, op, store));
            match result {
                Ok(marked) => {
                    if !marked.is_empty() {
                        debug!(
                            txn_id = id,
                            marked = ?marked,
                            "prepare invalidated other transactions"
                        );
                    }
                }
                Err(err) => {
                    self.preparation = None;
                    return Err(err.into());
                }
            }
        }

        if let Some(slot) = self.slot() {
            slot.clear_trace();
        }
        self.state = TxnState::Prepared { exclusive };
        debug!(txn_id = id, exclusive, "prepared");
        Ok(())
    }

    fn fail_conflicted(&mut self, mark: ConflictMark) -> OptiQuadError {
        let id = self.id();
        debug!(txn_id = id, by = mark.by, "conflict detected at prepare");
        if let Err(err) = self.rollback() {
            warn!(txn_id = id, error = %err, "rollback after conflict failed");
        }
        ConflictError { txn_id: id, by: mark.by }.into()
    }

    /// Prepares if needed, then makes the pending changes visible.
    ///
    /// On a store failure the store-level transaction is rolled back, and
    /// this transaction stays prepared with its holds until rolled back.
    pub fn commit(&mut self) -> Result<(), OptiQuadError> {
        if matches!(self.state, TxnState::Active | TxnState::Exclusive) {
            self.prepare()?;
        }
        let TxnState::Prepared { exclusive } = self.state else {
            return Err(self.invalid_state("commit"));
        };
        let id = self.id();

        if exclusive {
            self.store.commit_store_txn()?;
        } else {
            let flushed = self.flush()?;
            self.pending_events.extend(flushed);
        }
        let events = std::mem::take(&mut self.pending_events);
        let summary = self.written;

        self.finish();
        debug!(txn_id = id, exclusive, "committed");

        self.listeners.dispatch(&events);
        if summary.added || summary.removed {
            self.store_listeners.dispatch(&[ChangeEvent::StoreChanged {
                added: summary.added,
                removed: summary.removed,
            }]);
        }
        Ok(())
    }

    /// Discards pending changes and releases every hold. An exclusive
    /// transaction's direct writes are undone through the store.
    pub fn rollback(&mut self) -> Result<(), OptiQuadError> {
        if self.state == TxnState::Inactive {
            return Err(self.invalid_state("rollback"));
        }
        let undo = if self.is_exclusive() {
            self.store.rollback_store_txn()
        } else {
            Ok(())
        };
        let id = self.id();
        self.finish();
        debug!(txn_id = id, "rolled back");
        undo.map_err(OptiQuadError::from)
    }

    fn write(&mut self, kind: RecordKind, op: WriteOp) -> Result<usize, OptiQuadError> {
        if self.require_open("write")? {
            return self.write_through(kind, op);
        }
        let _write = self.coordinator.read_hold();
        let before = self.staged();
        let store = &*self.store;
        let delta = match kind {
            RecordKind::Explicit => &mut self.explicit,
            RecordKind::Inferred => &mut self.inferred,
        };
        let affected = match op {
            WriteOp::Add(record) => {
                delta.stage_add(record);
                1
            }
            WriteOp::Remove(pattern) => delta.stage_remove(&pattern, store)?,
        };
        let after = self.staged();
        if self.crossed_threshold(before, after) {
            self.try_escalate()?;
        }
        Ok(affected)
    }

    fn write_through(&mut self, kind: RecordKind, op: WriteOp) -> Result<usize, OptiQuadError> {
        let notify = kind == RecordKind::Explicit && self.listeners.has_listeners();
        match op {
            WriteOp::Add(record) => {
                if self.store.contains(&record, kind)? {
                    return Ok(0);
                }
                self.store.insert(std::slice::from_ref(&record), kind)?;
                self.written.added = true;
                if notify {
                    self.pending_events.push(ChangeEvent::Added(record));
                }
                Ok(1)
            }
            WriteOp::Remove(pattern) => {
                let matches = resolve_matches(&*self.store, &pattern, kind)?;
                if matches.is_empty() {
                    return Ok(0);
                }
                self.store.delete(&matches, kind)?;
                self.written.removed = true;
                let affected = matches.len();
                if notify {
                    self.pending_events
                        .extend(matches.into_iter().map(ChangeEvent::Removed));
                }
                Ok(affected)
            }
        }
    }

    fn staged(&self) -> usize {
        self.explicit.size() + self.inferred.size()
    }

    fn crossed_threshold(&self, before: usize, after: usize) -> bool {
        let block = self.policy.threshold;
        block != 0 && before / block != after / block
    }

    /// Becomes exclusive if this is the only active transaction, flushing
    /// everything staged so far. Failing to become exclusive is not an error.
    fn try_escalate(&mut self) -> Result<(), OptiQuadError> {
        if !self.policy.with_listeners && self.listeners.has_listeners() {
            return Ok(());
        }
        let Some(hold) = self.membership.as_mut() else {
            return Ok(());
        };
        // A marked transaction will fail at prepare anyway.
        if hold.slot().conflict().is_some() || !self.coordinator.try_escalate(hold) {
            debug!(
                txn_id = hold.id(),
                staged = self.explicit.size() + self.inferred.size(),
                "escalation refused"
            );
            return Ok(());
        }
        let id = hold.id();

        let flushed = self.pending_changes().and_then(|events| {
            self.store.begin_store_txn()?;
            if let Err(err) = self.write_deltas() {
                if let Err(undo) = self.store.rollback_store_txn() {
                    warn!(
                        txn_id = id,
                        error = %undo,
                        "store rollback after failed escalation failed"
                    );
                }
                return Err(err);
            }
            Ok(events)
        });
        let events = match flushed {
            Ok(events) => events,
            Err(err) => {
                warn!(txn_id = id, error = %err, "escalation flush failed");
                if let Some(hold) = self.membership.as_mut() {
                    self.coordinator.demote(hold);
                }
                return Err(err.into());
            }
        };

        self.record_written();
        self.pending_events.extend(events);
        self.explicit.clear();
        self.inferred.clear();
        if let Some(slot) = self.slot() {
            slot.clear_trace();
        }
        self.state = TxnState::Exclusive;
        debug!(txn_id = id, "escalated, now writing through");
        Ok(())
    }

    /// Writes both deltas inside one store-level transaction.
    fn flush(&mut self) -> Result<Vec<ChangeEvent>, OptiQuadError> {
        let id = self.id();
        let events = self.pending_changes()?;
        let start = Instant::now();
        self.store.begin_store_txn()?;
        record_lock_wait(LockStatKind::Flush, start.elapsed());
        let _flush = begin_lock_hold(LockStatKind::Flush);
        let result = self
            .write_deltas()
            .and_then(|()| self.store.commit_store_txn());
        if let Err(err) = result {
            warn!(txn_id = id, error = %err, "flush failed, rolling back store transaction");
            if let Err(undo) = self.store.rollback_store_txn() {
                warn!(txn_id = id, error = %undo, "store rollback failed");
            }
            return Err(err.into());
        }
        self.record_written();
        self.explicit.clear();
        self.inferred.clear();
        Ok(events)
    }

    fn write_deltas(&self) -> Result<(), StoreError> {
        self.explicit.write_to(&*self.store)?;
        self.inferred.write_to(&*self.store)
    }

    fn record_written(&mut self) {
        self.written.added |=
            !(self.explicit.added().is_empty() && self.inferred.added().is_empty());
        self.written.removed |=
            !(self.explicit.removed().is_empty() && self.inferred.removed().is_empty());
    }

    /// Per-record events for the explicit delta, computed against the store
    /// before it is written. Empty when nobody listens.
    fn pending_changes(&self) -> Result<Vec<ChangeEvent>, StoreError> {
        if !self.listeners.has_listeners() {
            return Ok(Vec::new());
        }
        let (added, removed) = self.explicit.effective_changes(&*self.store)?;
        Ok(removed
            .into_iter()
            .map(ChangeEvent::Removed)
            .chain(added.into_iter().map(ChangeEvent::Added))
            .collect())
    }

    fn trace(&self, expr: TupleExpr, bindings: BindingSet, include_inferred: bool) {
        if let Some(slot) = self.slot() {
            slot.record(ReadOperation::new(expr, bindings, include_inferred));
        }
    }

    fn slot(&self) -> Option<&TxnSlot> {
        self.membership.as_ref().map(MembershipHold::slot)
    }

    /// Ok(true) when writing through, Ok(false) when buffering.
    fn require_open(&self, op: &str) -> Result<bool, OptiQuadError> {
        match self.state {
            TxnState::Active => Ok(false),
            TxnState::Exclusive => Ok(true),
            _ => Err(self.invalid_state(op)),
        }
    }

    fn invalid_state(&self, op: &str) -> OptiQuadError {
        OptiQuadError::InvalidTransactionState(format!("cannot {op} in state {:?}", self.state))
    }

    fn finish(&mut self) {
        self.explicit.clear();
        self.inferred.clear();
        self.pending_events.clear();
        self.written = ChangeSummary::default();
        self.preparation = None;
        self.membership = None;
        self.state = TxnState::Inactive;
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TxnState::Inactive {
            let _ = self.rollback();
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id())
            .field("state", &self.state)
            .field("staged", &self.staged())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Slot;
    use crate::storage::MemoryStore;

    fn rec(s: &str, p: &str, o: &str) -> Record {
        Record::new(Term::iri(s), Term::iri(p), Term::iri(o))
    }

    fn setup(records: Vec<Record>) -> (Arc<MemoryStore>, Arc<LockCoordinator>) {
        (Arc::new(MemoryStore::with_records(records)), Arc::new(LockCoordinator::new()))
    }

    fn txn(store: &Arc<MemoryStore>, coord: &Arc<LockCoordinator>) -> Transaction {
        Transaction::new(
            store.clone(),
            Arc::clone(coord),
            EscalationPolicy::default(),
            Arc::new(ObserverList::new()),
        )
    }

    #[test]
    fn operations_require_begin() {
        let (store, coord) = setup(Vec::new());
        let mut t = txn(&store, &coord);
        assert!(matches!(
            t.add(rec("a", "b", "c")),
            Err(OptiQuadError::InvalidTransactionState(_))
        ));
        assert!(t.commit().is_err());
        assert!(t.rollback().is_err());
        t.begin().unwrap();
        assert!(matches!(t.begin(), Err(OptiQuadError::TransactionAlreadyActive)));
    }

    #[test]
    fn reads_see_own_pending_changes() {
        let (store, coord) = setup(vec![rec("alice", "likes", "dogs")]);
        let mut t = txn(&store, &coord);
        t.begin().unwrap();
        t.add(rec("alice", "likes", "cats")).unwrap();
        t.remove(&RecordPattern::any().object(Term::iri("dogs"))).unwrap();

        let seen = t.match_records(&RecordPattern::any(), false).unwrap();
        assert_eq!(seen, vec![rec("alice", "likes", "cats")]);

        let expr =
            TupleExpr::pattern(Slot::var("s"), Slot::value(Term::iri("likes")), Slot::var("o"));
        let rows = t.evaluate(&expr, &BindingSet::new(), false).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("o"), Some(&Term::iri("cats")));

        assert_eq!(store.len(RecordKind::Explicit), 1);
        t.commit().unwrap();
        assert_eq!(store.records(RecordKind::Explicit), vec![rec("alice", "likes", "cats")]);
    }

    #[test]
    fn structured_read_of_store_record_is_not_duplicated() {
        let (store, coord) = setup(vec![rec("alice", "likes", "cats")]);
        let mut t = txn(&store, &coord);
        t.begin().unwrap();
        t.add(rec("alice", "likes", "cats")).unwrap();
        let expr = TupleExpr::pattern(Slot::var("s"), Slot::var("p"), Slot::var("o"));
        assert_eq!(t.evaluate(&expr, &BindingSet::new(), false).unwrap().len(), 1);
    }

    #[test]
    fn prepare_clears_trace_and_commit_ends_cycle() {
        let (store, coord) = setup(Vec::new());
        let mut t = txn(&store, &coord);
        t.begin().unwrap();
        t.count(&RecordPattern::any(), false).unwrap();
        assert_eq!(t.trace_len(), 1);
        t.prepare().unwrap();
        assert_eq!(t.state(), TxnState::Prepared { exclusive: false });
        assert_eq!(t.trace_len(), 0);
        t.commit().unwrap();
        assert_eq!(t.state(), TxnState::Inactive);
        assert_eq!(coord.active_count(), 0);
    }

    #[test]
    fn rollback_discards_and_allows_reuse() {
        let (store, coord) = setup(Vec::new());
        let mut t = txn(&store, &coord);
        t.begin().unwrap();
        let first = t.id();
        t.add(rec("a", "b", "c")).unwrap();
        t.rollback().unwrap();
        assert!(store.is_empty());

        t.begin().unwrap();
        assert_ne!(t.id(), first);
        assert!(t.delta().is_empty());
        t.rollback().unwrap();
    }

    #[test]
    fn clear_removes_only_listed_contexts() {
        let g1 = Term::iri("g1");
        let (store, coord) = setup(vec![
            rec("a", "p", "1"),
            rec("b", "p", "2").in_context(g1.clone()),
            rec("c", "p", "3").in_context(Term::iri("g2")),
        ]);
        let mut t = txn(&store, &coord);
        t.begin().unwrap();
        assert_eq!(t.clear(&[None, Some(g1)]).unwrap(), 2);
        t.commit().unwrap();
        assert_eq!(
            store.records(RecordKind::Explicit),
            vec![rec("c", "p", "3").in_context(Term::iri("g2"))]
        );
    }

    #[test]
    fn dropping_active_transaction_releases_membership() {
        let (store, coord) = setup(Vec::new());
        {
            let mut t = txn(&store, &coord);
            t.begin().unwrap();
            assert_eq!(coord.active_count(), 1);
        }
        assert_eq!(coord.active_count(), 0);
    }

    #[test]
    fn removing_explicit_copy_keeps_inferred_copy_visible() {
        let (store, coord) = setup(vec![rec("alice", "type", "Person")]);
        store
            .insert(&[rec("alice", "type", "Person")], RecordKind::Inferred)
            .unwrap();
        let mut t = txn(&store, &coord);
        t.begin().unwrap();
        assert_eq!(t.remove(&RecordPattern::any()).unwrap(), 1);

        assert!(t.match_records(&RecordPattern::any(), false).unwrap().is_empty());
        assert_eq!(
            t.match_records(&RecordPattern::any(), true).unwrap(),
            vec![rec("alice", "type", "Person")]
        );
        let expr = TupleExpr::pattern(Slot::var("s"), Slot::var("p"), Slot::var("o"));
        assert!(t.evaluate(&expr, &BindingSet::new(), false).unwrap().is_empty());
        assert_eq!(t.evaluate(&expr, &BindingSet::new(), true).unwrap().len(), 1);
    }

    #[test]
    fn recorded_read_includes_own_pending_adds() {
        let (store, coord) = setup(Vec::new());
        let mut t = txn(&store, &coord);
        t.begin().unwrap();
        t.add(rec("x", "type", "Painter")).unwrap();
        let expr = TupleExpr::join(
            TupleExpr::pattern(Slot::var("p"), Slot::value(Term::iri("type")), Slot::var("t")),
            TupleExpr::pattern(Slot::var("p"), Slot::value(Term::iri("paints")), Slot::var("o")),
        );
        assert!(t.evaluate(&expr, &BindingSet::new(), false).unwrap().is_empty());

        assert_eq!(t.trace_len(), 1);

        let mut u = txn(&store, &coord);
        u.begin().unwrap();
        u.add(rec("x", "paints", "guernica")).unwrap();
        let by = u.id();
        u.commit().unwrap();
        assert_eq!(t.slot().and_then(TxnSlot::conflict).map(|m| m.by), Some(by));
    }
}
