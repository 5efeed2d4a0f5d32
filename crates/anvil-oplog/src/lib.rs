//! The operation log of an Anvil repository.
//!
//! Every state transition of a repository is an immutable [`Operation`]
//! stored in the object store. Operations form a DAG through their parent
//! links; the operations nobody has built on yet are the *heads*. Heads are
//! the only mutable shared state and are updated exclusively through
//! [`OpHeadsStore::compare_and_swap`].
//!
//! # Key Types
//!
//! - [`OperationGraph`]: insert/append operations and answer ancestry
//!   queries (common ancestor, topological order)
//! - [`OpHeadsStore`]: compare-and-swap handle on the head set, with
//!   [`InMemoryOpHeads`] and [`FileOpHeads`] implementations
//! - [`OplogError`]: error type for all of the above
//!
//! [`Operation`]: anvil_store::Operation

pub mod error;
pub mod graph;
pub mod heads;

pub use error::{OplogError, OplogResult};
pub use graph::{root_operation, OperationGraph, DEFAULT_MAX_RETRIES};
pub use heads::{FileOpHeads, InMemoryOpHeads, OpHeadsStore};
