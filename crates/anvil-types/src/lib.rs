//! Foundation types for Anvil.
//!
//! This crate provides the identifier and timestamp types used throughout the
//! Anvil hosting core. Every other Anvil crate depends on `anvil-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash)
//! - [`CommitId`], [`TreeId`], [`FileId`], [`SymlinkId`], [`ViewId`],
//!   [`OperationId`]: typed wrappers over [`ObjectId`] per object kind
//! - [`ChangeId`]: Random identity that survives commit rewrites
//! - [`Timestamp`]: Wall-clock time with the author's timezone offset

pub mod change;
pub mod error;
pub mod ids;
pub mod object;
pub mod timestamp;

pub use change::ChangeId;
pub use error::TypeError;
pub use ids::{CommitId, FileId, OperationId, SymlinkId, TreeId, ViewId};
pub use object::ObjectId;
pub use timestamp::Timestamp;
