//! Named references for Anvil views.
//!
//! A view maps three namespaces of names to commit targets: bookmarks,
//! tags, and workspaces. Each value is a [`RefTarget`], which is either a
//! single commit or a conflicted set of commits produced when two divergent
//! operations moved the same name in different directions. A name missing
//! from its map is absent.
//!
//! # Modules
//!
//! - [`error`]: Error types for ref operations
//! - [`types`]: [`RefTarget`], [`RefKind`], [`RefUpdate`]
//! - [`names`]: Bookmark/tag/workspace name validation

pub mod error;
pub mod names;
pub mod types;

pub use error::{RefError, Result};
pub use names::{validate_ref_name, validate_repo_name, validate_workspace_name};
pub use types::{RefKind, RefTarget, RefUpdate};
