//! Cross-transaction state: who is active, who is exclusive, who is
//! validating, and what every active transaction has read.
//!
//! Two independent lock domains live here:
//!
//! * membership: every transaction holds a shared hold from `begin` until it
//!   ends. A sole holder may upgrade to exclusive; while an exclusive holder
//!   exists `begin` blocks.
//! * preparation: buffered reads and writes take a shared hold for their
//!   duration, `prepare` takes the exclusive hold and keeps it until the
//!   transaction ends. Waiting writers block new readers.
//!
//! Holds are RAII tokens and are released exactly once, when dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::trace::{ReadOperation, ReadTrace};
use super::{TxnId, TXN_NONE};
use crate::core::lock_stats::{begin_lock_hold, record_lock_wait, LockHoldGuard, LockStatKind};

/// Set on a transaction whose recorded reads were invalidated by `by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictMark {
    pub by: TxnId,
}

/// The part of an active transaction other transactions may look at.
#[derive(Debug)]
pub struct TxnSlot {
    id: TxnId,
    trace: Mutex<ReadTrace>,
    conflict: Mutex<Option<ConflictMark>>,
}

impl TxnSlot {
    fn new(id: TxnId) -> Self {
        Self {
            id,
            trace: Mutex::new(ReadTrace::new()),
            conflict: Mutex::new(None),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn record(&self, op: ReadOperation) {
        self.trace.lock().record(op);
    }

    pub fn clear_trace(&self) {
        self.trace.lock().clear();
    }

    pub fn trace_len(&self) -> usize {
        self.trace.lock().len()
    }

    pub fn conflict(&self) -> Option<ConflictMark> {
        *self.conflict.lock()
    }

    /// Returns and clears the mark.
    pub fn take_conflict(&self) -> Option<ConflictMark> {
        self.conflict.lock().take()
    }

    /// The first mark wins.
    fn mark(&self, by: TxnId) -> bool {
        let mut conflict = self.conflict.lock();
        if conflict.is_some() {
            return false;
        }
        *conflict = Some(ConflictMark { by });
        true
    }
}

#[derive(Debug, Default)]
struct Membership {
    members: HashMap<TxnId, Arc<TxnSlot>>,
    exclusive: Option<TxnId>,
}

#[derive(Debug, Default)]
struct Preparation {
    readers: usize,
    writer: Option<TxnId>,
    writers_waiting: usize,
}

#[derive(Debug, Default)]
pub struct LockCoordinator {
    next_id: AtomicU64,
    membership: Mutex<Membership>,
    membership_released: Condvar,
    preparation: Mutex<Preparation>,
    preparation_released: Condvar,
}

impl LockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new transaction, waiting while another one is exclusive.
    pub fn begin(self: &Arc<Self>) -> MembershipHold {
        let start = Instant::now();
        let mut state = self.membership.lock();
        while state.exclusive.is_some() {
            self.membership_released.wait(&mut state);
        }
        record_lock_wait(LockStatKind::Membership, start.elapsed());

        let id = self.next_id.fetch_add(1, Ordering::AcqRel) + 1;
        let slot = Arc::new(TxnSlot::new(id));
        state.members.insert(id, Arc::clone(&slot));
        debug!(txn_id = id, active = state.members.len(), "transaction registered");
        drop(state);

        MembershipHold {
            coordinator: Arc::clone(self),
            slot,
            exclusive: false,
            _stats: begin_lock_hold(LockStatKind::Membership),
        }
    }

    /// Upgrades `hold` to exclusive if it is the only registered
    /// transaction. Never blocks: on failure the caller keeps its shared hold
    /// and nothing else changes.
    pub fn try_escalate(&self, hold: &mut MembershipHold) -> bool {
        if hold.exclusive {
            return true;
        }
        let id = hold.id();
        let mut state = self.membership.lock();
        let sole = state.exclusive.is_none()
            && state.members.len() == 1
            && state.members.contains_key(&id);
        if sole {
            state.exclusive = Some(id);
            hold.exclusive = true;
            debug!(txn_id = id, "transaction escalated to exclusive");
        }
        sole
    }

    /// Gives up exclusivity without ending the transaction.
    pub fn demote(&self, hold: &mut MembershipHold) {
        if !hold.exclusive {
            return;
        }
        let mut state = self.membership.lock();
        if state.exclusive == Some(hold.id()) {
            state.exclusive = None;
        }
        hold.exclusive = false;
        drop(state);
        self.membership_released.notify_all();
    }

    pub fn active_count(&self) -> usize {
        self.membership.lock().members.len()
    }

    pub fn exclusive_holder(&self) -> Option<TxnId> {
        self.membership.lock().exclusive
    }

    fn leave(&self, id: TxnId) {
        let mut state = self.membership.lock();
        state.members.remove(&id);
        if state.exclusive == Some(id) {
            state.exclusive = None;
        }
        debug!(txn_id = id, active = state.members.len(), "transaction unregistered");
        drop(state);
        self.membership_released.notify_all();
    }

    /// Shared preparation hold for one buffered read or write.
    pub fn read_hold(self: &Arc<Self>) -> PreparationHold {
        let start = Instant::now();
        let mut state = self.preparation.lock();
        while state.writer.is_some() || state.writers_waiting > 0 {
            self.preparation_released.wait(&mut state);
        }
        state.readers += 1;
        drop(state);
        record_lock_wait(LockStatKind::Preparation, start.elapsed());
        PreparationHold {
            coordinator: Arc::clone(self),
            writer: TXN_NONE,
            _stats: begin_lock_hold(LockStatKind::Preparation),
        }
    }

    /// Exclusive preparation hold, granted once every in-flight buffered
    /// operation has finished.
    pub fn prepare_hold(self: &Arc<Self>, id: TxnId) -> PreparationHold {
        let start = Instant::now();
        let mut state = self.preparation.lock();
        state.writers_waiting += 1;
        while state.writer.is_some() || state.readers > 0 {
            self.preparation_released.wait(&mut state);
        }
        state.writers_waiting -= 1;
        state.writer = Some(id);
        drop(state);
        record_lock_wait(LockStatKind::Preparation, start.elapsed());
        PreparationHold {
            coordinator: Arc::clone(self),
            writer: id,
            _stats: begin_lock_hold(LockStatKind::Preparation),
        }
    }

    fn release_preparation(&self, writer: TxnId) {
        let mut state = self.preparation.lock();
        if writer == TXN_NONE {
            state.readers -= 1;
            if state.readers > 0 {
                return;
            }
        } else {
            state.writer = None;
        }
        drop(state);
        self.preparation_released.notify_all();
    }

    /// Marks every other active transaction that has a recorded read for
    /// which `affects` returns true. Must be called by `committer` while it
    /// holds the exclusive preparation hold, so no trace can grow meanwhile.
    /// Transactions already marked are skipped. Returns the ids marked.
    pub fn validate<F, E>(&self, committer: TxnId, mut affects: F) -> Result<Vec<TxnId>, E>
    where
        F: FnMut(&ReadOperation) -> Result<bool, E>,
    {
        debug_assert_eq!(self.preparation.lock().writer, Some(committer));
        let others: Vec<Arc<TxnSlot>> = self
            .membership
            .lock()
            .members
            .values()
            .filter(|slot| slot.id != committer)
            .cloned()
            .collect();

        let mut marked = Vec::new();
        for slot in others {
            if slot.conflict().is_some() {
                continue;
            }
            let trace = slot.trace.lock();
            for op in trace.iter() {
                if affects(op)? {
                    if slot.mark(committer) {
                        warn!(
                            txn_id = slot.id,
                            by = committer,
                            "recorded read invalidated, transaction marked conflicted"
                        );
                        marked.push(slot.id);
                    }
                    break;
                }
            }
        }
        Ok(marked)
    }
}

/// Registration of one transaction in the membership domain.
#[derive(Debug)]
pub struct MembershipHold {
    coordinator: Arc<LockCoordinator>,
    slot: Arc<TxnSlot>,
    exclusive: bool,
    _stats: LockHoldGuard,
}

impl MembershipHold {
    pub fn id(&self) -> TxnId {
        self.slot.id
    }

    pub fn slot(&self) -> &TxnSlot {
        &self.slot
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

impl Drop for MembershipHold {
    fn drop(&mut self) {
        self.coordinator.leave(self.slot.id);
    }
}

/// A shared (`writer == TXN_NONE`) or exclusive preparation hold.
#[derive(Debug)]
pub struct PreparationHold {
    coordinator: Arc<LockCoordinator>,
    writer: TxnId,
    _stats: LockHoldGuard,
}

impl PreparationHold {
    pub fn is_exclusive(&self) -> bool {
        self.writer != TXN_NONE
    }
}

impl Drop for PreparationHold {
    fn drop(&mut self) {
        self.coordinator.release_preparation(self.writer);
    }
}
