use std::path::PathBuf;

use anvil_oplog::OplogError;
use anvil_pack::PackError;
use anvil_protocol::codes;
use anvil_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repository not initialized at {0}")]
    NotInitialized(PathBuf),

    #[error("repository already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("operation log error: {0}")]
    Oplog(#[from] OplogError),

    #[error("merge error: {0}")]
    Merge(#[from] anvil_merge::MergeError),

    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    #[error("invalid reference: {0}")]
    Ref(#[from] anvil_refs::RefError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Whether the data received or stored is untrustworthy: digest
    /// mismatches, unresolvable references, corrupt objects.
    pub fn is_integrity(&self) -> bool {
        match self {
            RepoError::Store(e) => e.is_integrity(),
            RepoError::Pack(e) => e.is_integrity(),
            RepoError::Oplog(OplogError::Store(e)) => e.is_integrity(),
            RepoError::Oplog(OplogError::MissingView { .. }) => true,
            _ => false,
        }
    }

    /// Whether the same request may succeed if simply tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepoError::Oplog(OplogError::RaceExceeded { .. }))
    }

    /// Stable code for `Error` frames.
    pub fn code(&self) -> u32 {
        match self {
            RepoError::Oplog(OplogError::RaceExceeded { .. }) => codes::RACE_EXCEEDED,
            RepoError::Oplog(OplogError::DanglingParent { .. }) => codes::DANGLING_PARENT,
            RepoError::Oplog(OplogError::UnknownOperation(_)) => codes::NOT_FOUND,
            RepoError::Store(StoreError::NotFound(_)) => codes::NOT_FOUND,
            RepoError::NotInitialized(_) => codes::NOT_FOUND,
            RepoError::Ref(_) => codes::REJECTED,
            _ if self.is_integrity() => codes::INTEGRITY,
            _ => codes::STORAGE,
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
