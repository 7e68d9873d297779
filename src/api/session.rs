use std::sync::Arc;

use tracing::debug;

use crate::core::errors::OptiQuadError;
use crate::core::record::{Record, RecordPattern, Term};
use crate::query::{BindingSet, TupleExpr};
use crate::storage::Store;
use crate::txn::{ChangeListener, ListenerId, LockCoordinator, Transaction};

/// One step of a batch passed to [`Session::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Add(Record),
    Remove(RecordPattern),
    AddInferred(Record),
    RemoveInferred(RecordPattern),
    /// Remove every explicit record in these contexts, or all when empty.
    Clear(Vec<Option<Term>>),
}

/// A caller's view of the store, wrapping one reusable [`Transaction`].
///
/// In auto-commit mode (the default) each mutating call runs in its own
/// implicit transaction, committed when the call returns and rolled back if
/// it fails. Reads outside a transaction go straight to the store. With
/// auto-commit off a transaction is always open; `commit` and `rollback`
/// end it and immediately begin the next.
pub struct Session {
    store: Arc<dyn Store>,
    coordinator: Arc<LockCoordinator>,
    txn: Transaction,
    auto_commit: bool,
    closed: bool,
}

impl Session {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        coordinator: Arc<LockCoordinator>,
        txn: Transaction,
    ) -> Self {
        Self {
            store,
            coordinator,
            txn,
            auto_commit: true,
            closed: false,
        }
    }

    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Switching auto-commit off begins a transaction; switching it back on
    /// commits the open one. If that commit fails and leaves no transaction
    /// open, as a conflict does, the session is in auto-commit mode when the
    /// error is returned.
    pub fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), OptiQuadError> {
        self.ensure_open()?;
        if auto_commit == self.auto_commit {
            return Ok(());
        }
        if auto_commit {
            if self.txn.is_active() {
                if let Err(err) = self.txn.commit() {
                    if !self.txn.is_active() {
                        self.auto_commit = true;
                        debug!(error = %err, "commit failed, session now auto-commit");
                    }
                    return Err(err);
                }
            }
        } else if !self.txn.is_active() {
            self.txn.begin()?;
        }
        self.auto_commit = auto_commit;
        debug!(auto_commit, "session mode changed");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.txn.is_active()
    }

    pub fn current_txn(&self) -> &Transaction {
        &self.txn
    }

    /// Begins a transaction and returns an RAII handle that rolls it back
    /// unless committed. Only available in auto-commit mode.
    pub fn transaction(&mut self) -> Result<SessionTxn<'_>, OptiQuadError> {
        self.ensure_open()?;
        if self.txn.is_active() {
            return Err(OptiQuadError::TransactionAlreadyActive);
        }
        self.txn.begin()?;
        Ok(SessionTxn { session: self })
    }

    pub fn commit(&mut self) -> Result<(), OptiQuadError> {
        self.ensure_open()?;
        if !self.txn.is_active() {
            return Err(OptiQuadError::NoActiveTransaction);
        }
        let result = self.txn.commit();
        self.rebegin_if_manual()?;
        result
    }

    pub fn rollback(&mut self) -> Result<(), OptiQuadError> {
        self.ensure_open()?;
        if !self.txn.is_active() {
            return Err(OptiQuadError::NoActiveTransaction);
        }
        let result = self.txn.rollback();
        self.rebegin_if_manual()?;
        result
    }

    /// Rolls back any open transaction. Never commits.
    pub fn close(&mut self) -> Result<(), OptiQuadError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.txn.is_active() {
            debug!(txn_id = self.txn.id(), "rolling back open transaction on close");
            self.txn.rollback()?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.txn.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.txn.remove_listener(id)
    }

    pub fn add(&mut self, record: Record) -> Result<(), OptiQuadError> {
        self.run(|txn| txn.add(record))
    }

    pub fn add_inferred(&mut self, record: Record) -> Result<(), OptiQuadError> {
        self.run(|txn| txn.add_inferred(record))
    }

    pub fn remove(&mut self, pattern: &RecordPattern) -> Result<usize, OptiQuadError> {
        self.run(|txn| txn.remove(pattern))
    }

    pub fn remove_inferred(&mut self, pattern: &RecordPattern) -> Result<usize, OptiQuadError> {
        self.run(|txn| txn.remove_inferred(pattern))
    }

    pub fn clear(&mut self, contexts: &[Option<Term>]) -> Result<usize, OptiQuadError> {
        self.run(|txn| txn.clear(contexts))
    }

    /// Runs every change as one unit: all of them commit together, or, on
    /// the first failure, none of them do.
    pub fn apply<I>(&mut self, changes: I) -> Result<usize, OptiQuadError>
    where
        I: IntoIterator<Item = Change>,
    {
        self.run(|txn| {
            let mut affected = 0;
            for change in changes {
                affected += match change {
                    Change::Add(record) => txn.add(record).map(|()| 1)?,
                    Change::AddInferred(record) => txn.add_inferred(record).map(|()| 1)?,
                    Change::Remove(pattern) => txn.remove(&pattern)?,
                    Change::RemoveInferred(pattern) => txn.remove_inferred(&pattern)?,
                    Change::Clear(contexts) => txn.clear(&contexts)?,
                };
            }
            Ok(affected)
        })
    }

    pub fn match_records(
        &self,
        pattern: &RecordPattern,
        include_inferred: bool,
    ) -> Result<Vec<Record>, OptiQuadError> {
        self.ensure_open()?;
        if self.txn.is_active() {
            return self.txn.match_records(pattern, include_inferred);
        }
        let _read = self.coordinator.read_hold();
        Ok(self.store.match_records(pattern, include_inferred)?)
    }

    pub fn count(
        &self,
        pattern: &RecordPattern,
        include_inferred: bool,
    ) -> Result<usize, OptiQuadError> {
        Ok(self.match_records(pattern, include_inferred)?.len())
    }

    pub fn evaluate(
        &self,
        expr: &TupleExpr,
        bindings: &BindingSet,
        include_inferred: bool,
    ) -> Result<Vec<BindingSet>, OptiQuadError> {
        self.ensure_open()?;
        if self.txn.is_active() {
            return self.txn.evaluate(expr, bindings, include_inferred);
        }
        let _read = self.coordinator.read_hold();
        Ok(self.store.evaluate(expr, bindings, include_inferred)?)
    }

    /// Runs `op` in the open transaction, or in a fresh implicit one that is
    /// committed on success and rolled back on failure.
    fn run<T, F>(&mut self, op: F) -> Result<T, OptiQuadError>
    where
        F: FnOnce(&mut Transaction) -> Result<T, OptiQuadError>,
    {
        self.ensure_open()?;
        if self.txn.is_active() {
            return op(&mut self.txn);
        }
        self.txn.begin()?;
        match op(&mut self.txn) {
            Ok(value) => {
                self.txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if self.txn.is_active() {
                    self.txn.rollback()?;
                }
                Err(err)
            }
        }
    }

    fn rebegin_if_manual(&mut self) -> Result<(), OptiQuadError> {
        if !self.auto_commit && !self.txn.is_active() {
            self.txn.begin()?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), OptiQuadError> {
        if self.closed {
            return Err(OptiQuadError::SessionClosed);
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// RAII transaction handle for [`Session`].
///
/// The transaction rolls back on drop if not explicitly committed or rolled
/// back.
pub struct SessionTxn<'a> {
    session: &'a mut Session,
}

impl<'a> SessionTxn<'a> {
    /// Commits the transaction. On a conflict it has already been rolled
    /// back; on a store failure it is rolled back when the handle drops.
    pub fn commit(self) -> Result<(), OptiQuadError> {
        self.session.txn.commit()
    }

    pub fn rollback(self) -> Result<(), OptiQuadError> {
        self.session.txn.rollback()
    }

    pub fn as_ref(&self) -> &Transaction {
        &self.session.txn
    }

    pub fn as_mut(&mut self) -> &mut Transaction {
        &mut self.session.txn
    }

    pub fn session_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl<'a> Drop for SessionTxn<'a> {
    fn drop(&mut self) {
        if self.session.txn.is_active() {
            let _ = self.session.txn.rollback();
        }
    }
}
