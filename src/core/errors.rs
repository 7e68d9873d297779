use thiserror::Error;

use crate::txn::TxnId;

#[derive(Debug, Error)]
pub enum OptiQuadError {
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid transaction state: {0}")]
    InvalidTransactionState(String),

    #[error("transaction already active")]
    TransactionAlreadyActive,

    #[error("no active transaction")]
    NoActiveTransaction,

    #[error("session closed")]
    SessionClosed,
}

impl OptiQuadError {
    /// True when the caller should retry the whole transaction.
    pub fn is_conflict(&self) -> bool {
        matches!(self, OptiQuadError::Conflict(_))
    }
}

/// Failure reported by the underlying store.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// A transaction's recorded reads were invalidated by another commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("transaction {txn_id} observed data changed by transaction {by}")]
pub struct ConflictError {
    pub txn_id: TxnId,
    pub by: TxnId,
}
