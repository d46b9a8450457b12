use std::fmt;

use thiserror::Error;

use super::types::{PageId, TxnId};

/// Reason code attached to a transaction abort raised by the lock
/// manager, for a policy violation or because the transaction was
/// wounded by an older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Lock requested while the transaction was already shrinking
    LockOnShrinking,
    /// Shared lock requested under READ_UNCOMMITTED
    SharedOnReadUncommitted,
    /// A concurrent upgrade on the same record was already in flight
    UpgradeConflict,
    /// Wounded by an older transaction
    Deadlock,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortReason::LockOnShrinking => "lock acquired on shrinking transaction",
            AbortReason::SharedOnReadUncommitted => "shared lock under read-uncommitted",
            AbortReason::UpgradeConflict => "concurrent lock upgrade on the same record",
            AbortReason::Deadlock => "wounded by an older transaction",
        };
        f.write_str(s)
    }
}

/// Database error types
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("buffer pool has no free or evictable frame")]
    PoolExhausted,

    #[error("invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("page overflow: tuple size {tuple_size} exceeds available space {available}")]
    PageOverflow { tuple_size: usize, available: usize },

    #[error("invalid slot ID: {0}")]
    InvalidSlotId(u16),

    #[error("slot {0} is empty")]
    EmptySlot(u16),

    #[error("disk scheduler error: {0}")]
    Scheduler(String),

    #[error("corrupted data: {0}")]
    Corrupted(String),

    #[error("transaction {txn_id} aborted: {reason}")]
    TransactionAborted { txn_id: TxnId, reason: AbortReason },
}

impl StrataError {
    /// Returns the abort reason if this error is a transaction abort.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            StrataError::TransactionAborted { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
