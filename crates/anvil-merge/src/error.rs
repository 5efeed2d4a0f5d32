use anvil_store::StoreError;
use anvil_types::CommitId;

/// Errors from merging views.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A head named by one of the views is not in the store.
    #[error("commit not found while merging: {0}")]
    MissingCommit(CommitId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;
