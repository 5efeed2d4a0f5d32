use anvil_types::ObjectId;

use crate::object::ObjectKind;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// An object already stored under this id has different bytes.
    #[error("integrity violation: {id} already holds different content")]
    IntegrityConflict { id: ObjectId },

    /// The declared id does not match the digest of the object bytes.
    #[error("digest mismatch: declared {declared}, computed {computed}")]
    DigestMismatch {
        declared: ObjectId,
        computed: ObjectId,
    },

    /// An object references something that is neither stored nor earlier in
    /// the same batch.
    #[error("{from} references missing object {missing}")]
    MissingReference { from: ObjectId, missing: ObjectId },

    /// The object exists but is of a different kind than requested.
    #[error("object {id} is a {actual}, expected {expected}")]
    KindMismatch {
        id: ObjectId,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    /// The object data is malformed or cannot be decoded.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether this error means the data itself is untrustworthy, as opposed
    /// to a missing object or an I/O failure.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            StoreError::IntegrityConflict { .. }
                | StoreError::DigestMismatch { .. }
                | StoreError::MissingReference { .. }
                | StoreError::KindMismatch { .. }
                | StoreError::CorruptObject { .. }
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
