//! Integrity check over everything reachable from the operation heads.

use std::collections::{BTreeSet, HashSet};

use anvil_store::{ObjectKind, ObjectStore, StoreError, StoredObject};
use anvil_types::ObjectId;
use tracing::{info, warn};

use crate::error::RepoResult;
use crate::repository::Repository;

/// Findings of [`Repository::fsck`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FsckReport {
    /// Objects read and re-hashed.
    pub objects_checked: usize,
    pub operations: usize,
    /// Referenced but not in the store.
    pub missing: BTreeSet<ObjectId>,
    /// Present, but the bytes do not hash to the id or do not decode.
    pub corrupt: BTreeSet<ObjectId>,
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.corrupt.is_empty()
    }
}

impl Repository {
    /// Re-hash every object reachable from the operation heads and check
    /// that every reference resolves.
    pub fn fsck(&self) -> RepoResult<FsckReport> {
        let store = self.store().as_ref();
        let mut report = FsckReport::default();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut stack: Vec<ObjectId> = self.heads()?.into_iter().map(ObjectId::from).collect();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(object) = load(store, &id, &mut report)? else {
                continue;
            };
            report.objects_checked += 1;
            if object.compute_id() != id {
                warn!(object = %id.short_hex(), "object does not hash to its id");
                report.corrupt.insert(id);
                continue;
            }
            // Decoding doubles as a structural check. Commit predecessors
            // are not followed; they need not be present.
            match object.references() {
                Ok(refs) => stack.extend(refs.into_iter().filter(|r| !seen.contains(r))),
                Err(_) => {
                    warn!(object = %id.short_hex(), kind = %object.kind, "object does not decode");
                    report.corrupt.insert(id);
                }
            }
            if object.kind == ObjectKind::Operation {
                report.operations += 1;
            }
        }

        info!(
            objects = report.objects_checked,
            operations = report.operations,
            missing = report.missing.len(),
            corrupt = report.corrupt.len(),
            "fsck finished"
        );
        Ok(report)
    }
}

fn load(
    store: &dyn ObjectStore,
    id: &ObjectId,
    report: &mut FsckReport,
) -> RepoResult<Option<StoredObject>> {
    match store.get(id) {
        Ok(object) => Ok(Some(object)),
        Err(StoreError::NotFound(_)) => {
            warn!(object = %id.short_hex(), "referenced object is missing");
            report.missing.insert(*id);
            Ok(None)
        }
        Err(e) if e.is_integrity() => {
            warn!(object = %id.short_hex(), error = %e, "object failed verification");
            report.corrupt.insert(*id);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_store::{Signature, Tree, TreeValue};
    use anvil_types::{CommitId, Timestamp};

    fn populate(repo: &Repository) -> (CommitId, ObjectId) {
        let file = repo.write_file(b"hello").unwrap();
        let mut tree = Tree::empty();
        tree.insert("hello.txt", TreeValue::File { id: file, executable: false })
            .unwrap();
        let tree = repo.write_tree(&tree).unwrap();
        let sig = Signature::new("Ada", "ada@example.com", Timestamp::new(0, 0));
        let commit = repo.new_commit(vec![], tree, "init", sig).unwrap();
        let mut tx = repo.start_transaction("bookmark-move", "ada").unwrap();
        tx.set_bookmark("main", commit).unwrap();
        tx.commit().unwrap();
        (commit, file.into())
    }

    #[test]
    fn healthy_repository_is_clean() {
        let repo = Repository::init_in_memory().unwrap();
        populate(&repo);
        let report = repo.fsck().unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.operations, 2);
        // 2 ops, 2 views, commit, tree, file
        assert_eq!(report.objects_checked, 7);
    }

    #[test]
    fn missing_and_tampered_objects_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let (commit, file) = populate(&repo);

        let store = dir.path().join("store");
        std::fs::remove_file(store.join("files").join(file.to_hex())).unwrap();
        let commit_path = store.join("commits").join(commit.to_hex());
        let mut bytes = std::fs::read(&commit_path).unwrap();
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xff;
        }
        std::fs::write(&commit_path, bytes).unwrap();

        let report = repo.fsck().unwrap();
        assert!(!report.is_clean());
        assert!(report.corrupt.contains(&ObjectId::from(commit)));
        // The tree is only reachable through the corrupt commit.
        assert!(report.missing.is_empty());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let (_, file) = populate(&repo);
        std::fs::remove_file(dir.path().join("store/files").join(file.to_hex())).unwrap();

        let report = repo.fsck().unwrap();
        assert_eq!(report.missing, BTreeSet::from([file]));
        assert!(report.corrupt.is_empty());
    }
}
