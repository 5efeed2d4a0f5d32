use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use anvil_store::{Commit, ObjectStore, ObjectStoreExt, StoreError};
use anvil_types::CommitId;

use crate::error::{MergeError, MergeResult};

/// Source of commit parent links for head pruning.
pub trait CommitAncestry: Send + Sync {
    fn parents(&self, id: &CommitId) -> MergeResult<Vec<CommitId>>;

    /// All strict ancestors of `ids`: reachable through at least one parent
    /// link. The starting commits are only included if one of them is an
    /// ancestor of another.
    fn strict_ancestors(&self, ids: &BTreeSet<CommitId>) -> MergeResult<HashSet<CommitId>> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for id in ids {
            for parent in self.parents(id)? {
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        while let Some(current) = queue.pop_front() {
            for parent in self.parents(&current)? {
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        Ok(visited)
    }
}

/// Reads commit parents from an object store.
pub struct StoreAncestry {
    store: Arc<dyn ObjectStore>,
}

impl StoreAncestry {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

impl CommitAncestry for StoreAncestry {
    fn parents(&self, id: &CommitId) -> MergeResult<Vec<CommitId>> {
        match self.store.read_object::<Commit>(*id) {
            Ok(commit) => Ok(commit.parents),
            Err(StoreError::NotFound(_)) => Err(MergeError::MissingCommit(*id)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_store::{InMemoryObjectStore, Signature, Tree};
    use anvil_types::{ChangeId, Timestamp};

    fn commit(store: &dyn ObjectStore, parents: Vec<CommitId>, desc: &str) -> CommitId {
        let tree = store.write_object(&Tree::empty()).unwrap();
        let sig = Signature::new("t", "t@example.com", Timestamp::epoch());
        store
            .write_object(&Commit {
                parents,
                predecessors: vec![],
                root_tree: vec![tree],
                change_id: ChangeId::generate(),
                description: desc.into(),
                author: sig.clone(),
                committer: sig,
                secure_sig: None,
            })
            .unwrap()
    }

    #[test]
    fn store_ancestry_walks_parents() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let a = commit(&*store, vec![], "a");
        let b = commit(&*store, vec![a], "b");
        let c = commit(&*store, vec![b], "c");
        let ancestry = StoreAncestry::new(store);
        let found = ancestry.strict_ancestors(&BTreeSet::from([c])).unwrap();
        assert_eq!(found, HashSet::from([a, b]));
    }

    #[test]
    fn missing_commit_is_reported() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let ghost = CommitId::new(anvil_types::ObjectId::from_hash([3; 32]));
        let ancestry = StoreAncestry::new(store);
        assert!(matches!(
            ancestry.parents(&ghost),
            Err(MergeError::MissingCommit(id)) if id == ghost
        ));
    }
}
