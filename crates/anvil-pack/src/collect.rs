//! Selecting the objects a peer is missing, in dependency order.

use std::collections::{BTreeSet, HashSet};

use anvil_store::{Commit, ObjectStore, Operation, StoreObject, StoredObject, Tree, TreeValue, View};
use anvil_types::{CommitId, ObjectId, OperationId, TreeId, ViewId};
use tracing::debug;

use crate::entry::PackEntry;
use crate::error::PackResult;

/// Walks the store from a list of operations and gathers every object a
/// receiver needs to apply them.
///
/// Output order is files, trees (children first), commits (parents first),
/// views, then operations in the order given, so a receiver can validate
/// the batch front to back.
pub struct ObjectCollector<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> ObjectCollector<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Commits reachable from `roots` through parent links, roots included.
    pub fn reachable_commits(
        &self,
        roots: impl IntoIterator<Item = CommitId>,
    ) -> PackResult<HashSet<CommitId>> {
        let mut seen = HashSet::new();
        let mut stack: Vec<CommitId> = roots.into_iter().collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let commit = self.read::<Commit>(id.into())?.1;
            stack.extend(commit.parents.iter().filter(|p| !seen.contains(*p)));
        }
        Ok(seen)
    }

    /// Commits named by the views of the given operations.
    pub fn view_commits(&self, ops: &BTreeSet<OperationId>) -> PackResult<BTreeSet<CommitId>> {
        let mut ids = BTreeSet::new();
        for op in ops {
            let op = self.read::<Operation>((*op).into())?.1;
            let view = self.read::<View>(op.view_id.into())?.1;
            ids.extend(view.all_commit_ids());
        }
        Ok(ids)
    }

    /// Collect everything needed for `operations` (parents first), skipping
    /// commits (and their history) in `have_commits`.
    pub fn collect(
        &self,
        operations: &[OperationId],
        have_commits: &HashSet<CommitId>,
    ) -> PackResult<Vec<PackEntry>> {
        let mut op_entries = Vec::with_capacity(operations.len());
        let mut view_entries = Vec::new();
        let mut seen_views: HashSet<ViewId> = HashSet::new();
        let mut wanted_commits: BTreeSet<CommitId> = BTreeSet::new();

        for op_id in operations {
            let (op_obj, op) = self.read::<Operation>((*op_id).into())?;
            if seen_views.insert(op.view_id) {
                let (view_obj, view) = self.read::<View>(op.view_id.into())?;
                wanted_commits.extend(
                    view.all_commit_ids()
                        .into_iter()
                        .filter(|c| !have_commits.contains(c)),
                );
                view_entries.push(PackEntry::new(op.view_id.into(), view_obj));
            }
            op_entries.push(PackEntry::new((*op_id).into(), op_obj));
        }

        let commit_entries = self.collect_commits(&wanted_commits, have_commits)?;

        let mut tree_entries = Vec::new();
        let mut file_ids: Vec<ObjectId> = Vec::new();
        let mut seen_trees: HashSet<TreeId> = HashSet::new();
        let mut seen_files: HashSet<ObjectId> = HashSet::new();
        for (_, commit) in &commit_entries {
            for root in &commit.root_tree {
                self.collect_tree(
                    *root,
                    &mut seen_trees,
                    &mut seen_files,
                    &mut tree_entries,
                    &mut file_ids,
                )?;
            }
        }

        let mut out = Vec::with_capacity(
            file_ids.len()
                + tree_entries.len()
                + commit_entries.len()
                + view_entries.len()
                + op_entries.len(),
        );
        for id in file_ids {
            out.push(PackEntry::new(id, self.store.get(&id)?));
        }
        out.extend(tree_entries);
        out.extend(commit_entries.into_iter().map(|(entry, _)| entry));
        out.extend(view_entries);
        out.extend(op_entries);

        debug!(
            operations = operations.len(),
            objects = out.len(),
            "collected objects for transfer"
        );
        Ok(out)
    }

    fn read<T: StoreObject>(&self, id: ObjectId) -> PackResult<(StoredObject, T)> {
        let obj = self.store.get(&id)?;
        let decoded = T::from_stored_object(&obj)?;
        Ok((obj, decoded))
    }

    /// Post-order walk so parents come out before children.
    fn collect_commits(
        &self,
        roots: &BTreeSet<CommitId>,
        have: &HashSet<CommitId>,
    ) -> PackResult<Vec<(PackEntry, Commit)>> {
        let mut out = Vec::new();
        let mut done: HashSet<CommitId> = HashSet::new();
        let mut stack: Vec<(CommitId, bool)> = roots.iter().rev().map(|id| (*id, false)).collect();

        while let Some((id, expanded)) = stack.pop() {
            if done.contains(&id) || have.contains(&id) {
                continue;
            }
            let (obj, commit) = self.read::<Commit>(id.into())?;
            if expanded {
                done.insert(id);
                out.push((PackEntry::new(id.into(), obj), commit));
                continue;
            }
            stack.push((id, true));
            for parent in commit.parents.iter().rev() {
                if !done.contains(parent) && !have.contains(parent) {
                    stack.push((*parent, false));
                }
            }
        }
        Ok(out)
    }

    /// Post-order walk so subtrees come out before the trees naming them.
    fn collect_tree(
        &self,
        root: TreeId,
        seen_trees: &mut HashSet<TreeId>,
        seen_files: &mut HashSet<ObjectId>,
        trees_out: &mut Vec<PackEntry>,
        files_out: &mut Vec<ObjectId>,
    ) -> PackResult<()> {
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if seen_trees.contains(&id) {
                continue;
            }
            let (obj, tree) = self.read::<Tree>(id.into())?;
            if expanded {
                seen_trees.insert(id);
                trees_out.push(PackEntry::new(id.into(), obj));
                continue;
            }
            stack.push((id, true));
            for (_, value) in tree.entries() {
                push_value(value, &mut stack, seen_files, files_out);
            }
        }
        Ok(())
    }
}

fn push_value(
    value: &TreeValue,
    stack: &mut Vec<(TreeId, bool)>,
    seen_files: &mut HashSet<ObjectId>,
    files_out: &mut Vec<ObjectId>,
) {
    match value {
        TreeValue::Tree(id) => stack.push((*id, false)),
        TreeValue::File { id, .. } => {
            let id: ObjectId = (*id).into();
            if seen_files.insert(id) {
                files_out.push(id);
            }
        }
        TreeValue::Symlink(id) => {
            let id: ObjectId = (*id).into();
            if seen_files.insert(id) {
                files_out.push(id);
            }
        }
        TreeValue::Conflict(terms) => {
            for term in terms {
                push_value(term, stack, seen_files, files_out);
            }
        }
    }
}
