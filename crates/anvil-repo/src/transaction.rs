use std::collections::BTreeSet;

use anvil_merge::{CommitAncestry, StoreAncestry};
use anvil_refs::{validate_ref_name, validate_workspace_name, RefKind, RefTarget};
use anvil_store::{ObjectStoreExt, Operation, OperationMetadata, View};
use anvil_types::{CommitId, OperationId, Timestamp};
use tracing::debug;

use crate::error::RepoResult;
use crate::repository::Repository;

/// A pending change to a repository's view.
///
/// Edits accumulate on a private copy of the base view; [`commit`](Self::commit)
/// writes the new view and appends one operation on top of the base.
pub struct Transaction<'r> {
    repo: &'r Repository,
    base: OperationId,
    view: View,
    metadata: OperationMetadata,
}

impl<'r> Transaction<'r> {
    pub(crate) fn new(
        repo: &'r Repository,
        base: OperationId,
        view: View,
        metadata: OperationMetadata,
    ) -> Self {
        Self {
            repo,
            base,
            view,
            metadata,
        }
    }

    /// The operation this transaction builds on.
    pub fn base(&self) -> OperationId {
        self.base
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_tag(key, value);
        self
    }

    /// Set or remove a reference of any kind.
    pub fn set_ref(&mut self, kind: RefKind, name: &str, target: Option<RefTarget>) -> RepoResult<()> {
        match kind {
            RefKind::Workspace => validate_workspace_name(name)?,
            _ => validate_ref_name(kind, name)?,
        }
        if let Some(target) = &target {
            self.view.head_ids.extend(target.members());
        }
        self.view.set_ref(kind, name, target);
        Ok(())
    }

    /// Point a bookmark at `commit`, resolving any conflict it had.
    pub fn set_bookmark(&mut self, name: &str, commit: CommitId) -> RepoResult<()> {
        self.set_ref(RefKind::Bookmark, name, Some(RefTarget::normal(commit)))
    }

    pub fn delete_bookmark(&mut self, name: &str) -> RepoResult<()> {
        self.set_ref(RefKind::Bookmark, name, None)
    }

    pub fn set_tag(&mut self, name: &str, commit: CommitId) -> RepoResult<()> {
        self.set_ref(RefKind::Tag, name, Some(RefTarget::normal(commit)))
    }

    /// Record which commit a workspace has checked out.
    pub fn set_workspace(&mut self, name: &str, commit: CommitId) -> RepoResult<()> {
        self.set_ref(RefKind::Workspace, name, Some(RefTarget::normal(commit)))
    }

    /// Make `commit` visible without naming it.
    pub fn add_head(&mut self, commit: CommitId) {
        self.view.head_ids.insert(commit);
    }

    /// Write the view and append the operation. Heads that are ancestors of
    /// other heads are dropped first.
    pub fn commit(mut self) -> RepoResult<OperationId> {
        if self.view.head_ids.len() > 1 {
            let ancestry = StoreAncestry::new(self.repo.store().clone());
            let hidden = ancestry.strict_ancestors(&self.view.head_ids)?;
            self.view.head_ids = self
                .view
                .head_ids
                .iter()
                .filter(|id| !hidden.contains(id))
                .copied()
                .collect::<BTreeSet<_>>();
        }

        let view_id = self.repo.store().write_object(&self.view)?;
        let mut metadata = self.metadata;
        metadata.end_time = Timestamp::now();
        let op = Operation::new(view_id, vec![self.base], metadata);
        let id = self.repo.graph().append(&op)?;
        debug!(
            op = %id.short_hex(),
            base = %self.base.short_hex(),
            description = %op.metadata.description,
            "committed transaction"
        );
        Ok(id)
    }
}
