//! Error types for the operation log.

use anvil_store::StoreError;
use anvil_types::{OperationId, ViewId};

/// Errors that can occur during operation log updates and queries.
#[derive(Debug, thiserror::Error)]
pub enum OplogError {
    /// An operation names a parent that is not in the store.
    #[error("dangling parent: operation {op} references missing parent {parent}")]
    DanglingParent {
        op: OperationId,
        parent: OperationId,
    },

    /// An operation names a view that is not in the store.
    #[error("operation {op} references missing view {view}")]
    MissingView { op: OperationId, view: ViewId },

    /// The requested operation is not in the store.
    #[error("unknown operation: {0}")]
    UnknownOperation(OperationId),

    /// The heads pointer kept moving underneath us.
    #[error("gave up installing heads after {attempts} attempts")]
    RaceExceeded { attempts: u32 },

    /// The persisted head set could not be parsed.
    #[error("corrupt op heads file: {0}")]
    CorruptHeads(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("op heads lock poisoned")]
    LockPoisoned,
}

/// Convenience alias for operation log results.
pub type OplogResult<T> = Result<T, OplogError>;
