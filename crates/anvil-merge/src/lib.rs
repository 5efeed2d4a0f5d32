//! Three-way merge of repository views.
//!
//! When two operations diverge from a common ancestor, their views are
//! reconciled with [`ViewMerger::merge`]. The merge is deterministic and
//! symmetric: swapping the two sides yields the same view and the same set
//! of [`ConflictNote`]s. References moved in two different directions (a
//! deletion counts as a direction) become
//! [`RefTarget::Conflicted`](anvil_refs::RefTarget::Conflicted) rather than
//! an error.
//!
//! # Key Types
//!
//! - [`ViewMerger`]: the merge engine
//! - [`CommitAncestry`]: how the merger learns commit parents, with
//!   [`StoreAncestry`] reading them from an object store
//! - [`MergeOutcome`], [`ConflictNote`]: merge results

pub mod ancestry;
pub mod error;
pub mod view;

pub use ancestry::{CommitAncestry, StoreAncestry};
pub use error::{MergeError, MergeResult};
pub use view::{merge_ref_target, ConflictNote, MergeOutcome, ViewMerger};
