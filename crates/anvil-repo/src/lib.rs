//! Repository facade for Anvil.
//!
//! Ties the object store, the operation log and the view merger together
//! into the operations a forge server and its clients actually perform:
//! editing views in transactions, computing and applying object transfers,
//! and installing pushed operations with bounded optimistic retries.
//!
//! # Key Types
//!
//! - [`Repository`]: an on-disk or in-memory repository
//! - [`Transaction`]: pending edits to the current view
//! - [`PushOutcome`], [`Outgoing`]: results of the transfer helpers
//! - [`FsckReport`]: findings of an integrity check
//! - [`RepoError`]: error type with wire codes and retryability

pub mod error;
pub mod fsck;
pub mod repository;
pub mod transaction;

pub use error::{RepoError, RepoResult};
pub use fsck::FsckReport;
pub use repository::{signature_now, Outgoing, PushOutcome, Repository, PRINCIPAL_TAG};
pub use transaction::Transaction;

// Re-export the types callers need to build content and read views.
pub use anvil_merge::ConflictNote;
pub use anvil_refs::{RefKind, RefTarget, RefUpdate};
pub use anvil_store::{Commit, Operation, Signature, Tree, TreeValue, View};
pub use anvil_types::{ChangeId, CommitId, ObjectId, OperationId, TreeId};
