mod api;
mod core;
mod query;
mod storage;
mod txn;

pub use crate::api::{Change, OptimisticStore, Session, SessionTxn, StoreConfig};
pub use crate::core::errors::{ConflictError, OptiQuadError, StoreError};
pub use crate::core::lock_stats::{
    lock_stats_enabled, reset_lock_stats, set_lock_stats_enabled, snapshot_lock_stats,
    LockCounterSnapshot, LockStatsSnapshot,
};
pub use crate::core::record::{Record, RecordKind, RecordPattern, RecordSet, Term};
pub use crate::query::{
    basic_nodes, evaluate, is_marked, BindingSet, CompareOp, Condition, DeltaMerger,
    ExternalRecords, Operand, PatternContext, Slot, StatementPattern, TupleExpr, DELTA_MARKER,
};
pub use crate::storage::{MemoryStore, Store};
pub use crate::txn::{
    affects, ChangeEvent, ChangeListener, ConflictMark, Delta, EscalationPolicy, IsolationLevel,
    ListenerId, LockCoordinator, MembershipHold, ObserverList, PreparationHold, ReadOperation,
    ReadTrace, Transaction, TxnId, TxnSlot, TxnState, LARGE_BLOCK, TXN_NONE,
};
