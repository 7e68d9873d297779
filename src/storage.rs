//! The record store the concurrency layer sits in front of.
//!
//! The store gives no isolation of its own: every call observes whatever was
//! last written. The transaction layer only writes through `insert`/`delete`
//! while it holds a store-level transaction, which is what makes a flush
//! atomic.

pub mod memory;

use crate::core::errors::StoreError;
use crate::core::record::{Record, RecordKind, RecordPattern};
use crate::query::{BindingSet, TupleExpr};

pub use memory::MemoryStore;

pub trait Store: Send + Sync {
    /// Point-in-time match. Inferred records are included only when asked.
    fn match_records(
        &self,
        pattern: &RecordPattern,
        include_inferred: bool,
    ) -> Result<Vec<Record>, StoreError>;

    fn evaluate(
        &self,
        expr: &TupleExpr,
        bindings: &BindingSet,
        include_inferred: bool,
    ) -> Result<Vec<BindingSet>, StoreError>;

    fn contains(&self, record: &Record, kind: RecordKind) -> Result<bool, StoreError>;

    fn insert(&self, records: &[Record], kind: RecordKind) -> Result<(), StoreError>;

    fn delete(&self, records: &[Record], kind: RecordKind) -> Result<(), StoreError>;

    fn begin_store_txn(&self) -> Result<(), StoreError>;

    fn commit_store_txn(&self) -> Result<(), StoreError>;

    fn rollback_store_txn(&self) -> Result<(), StoreError>;
}
