//! Content-addressed object storage for Anvil.
//!
//! Every piece of repository data (file contents, symlink targets, trees,
//! commits, views and operations) is stored as an immutable object identified
//! by the BLAKE3 hash of its canonical bytes, domain-separated by object kind.
//!
//! # Object Types
//!
//! - file and symlink contents -- raw bytes, never interpreted
//! - [`Tree`] -- ordered name to [`TreeValue`] mapping
//! - [`Commit`] -- parents, predecessors, a merge of root trees, change id
//! - [`View`] -- visible heads plus bookmarks, tags and workspaces
//! - [`Operation`] -- one transition of the operation log, pointing at a view
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileObjectStore`] -- one file per object under `commits/`, `trees/`,
//!   `files/` and `operations/`, written through a temp file and renamed
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written. Nothing is ever deleted.
//! 2. Writing the same bytes twice is a no-op; writing different bytes under
//!    an existing id is an integrity violation.
//! 3. [`ObjectStore::apply_batch`] validates a whole batch before writing any
//!    of it: digests, existing content and internal references.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod batch;
pub mod commit;
pub mod error;
pub mod file;
pub mod memory;
pub mod object;
pub mod operation;
pub mod traits;
pub mod tree;

pub use batch::validate_batch;
pub use commit::{Commit, SecureSig, Signature, SignatureStatus};
pub use error::{StoreError, StoreResult};
pub use file::FileObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{ObjectKind, StoreObject, StoredObject};
pub use operation::{Operation, OperationMetadata, View};
pub use traits::{ObjectStore, ObjectStoreExt};
pub use tree::{Tree, TreeValue};
