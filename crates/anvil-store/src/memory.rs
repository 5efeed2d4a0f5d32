use std::collections::HashMap;
use std::sync::RwLock;

use anvil_types::ObjectId;

use crate::batch::validate_batch;
use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held behind a `RwLock`;
/// `apply_batch` holds the write lock across validation and insertion, so a
/// batch is visible all at once or not at all.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.objects.read().map_err(|_| StoreError::LockPoisoned)?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Sorted list of every stored object id.
    pub fn all_ids(&self) -> StoreResult<Vec<ObjectId>> {
        let map = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    #[cfg(test)]
    pub(crate) fn overwrite_for_test(&self, id: ObjectId, object: StoredObject) {
        self.objects.write().unwrap().insert(id, object);
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn try_get(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let map = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(id).cloned())
    }

    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        let mut map = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        match map.get(&id) {
            Some(existing) if existing != object => Err(StoreError::IntegrityConflict { id }),
            Some(_) => Ok(id),
            None => {
                map.insert(id, object.clone());
                Ok(id)
            }
        }
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.contains_key(id))
    }

    fn apply_batch(&self, objects: &[(ObjectId, StoredObject)]) -> StoreResult<Vec<ObjectId>> {
        let mut map = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        let to_write = validate_batch(
            objects,
            |id| Ok(map.get(id).cloned()),
            |id| Ok(map.contains_key(id)),
        )?;
        for index in to_write {
            let (id, object) = &objects[index];
            map.insert(*id, object.clone());
        }
        Ok(objects.iter().map(|(id, _)| *id).collect())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.objects.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::commit::{Commit, Signature};
    use crate::object::{ObjectKind, StoreObject};
    use crate::operation::{Operation, OperationMetadata, View};
    use crate::traits::ObjectStoreExt;
    use crate::tree::{Tree, TreeValue};
    use anvil_refs::RefTarget;
    use anvil_types::{ChangeId, Timestamp};
    use proptest::prelude::*;

    fn commit_on(tree: anvil_types::TreeId, parents: Vec<anvil_types::CommitId>) -> Commit {
        let sig = Signature::new("t", "t@example.com", Timestamp::new(0, 0));
        Commit {
            parents,
            predecessors: vec![],
            root_tree: vec![tree],
            change_id: ChangeId::from_bytes([1; 16]),
            description: String::new(),
            author: sig.clone(),
            committer: sig,
            secure_sig: None,
        }
    }

    fn entry(obj: StoredObject) -> (ObjectId, StoredObject) {
        (obj.compute_id(), obj)
    }

    // -----------------------------------------------------------------------
    // put / get / exists
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get_file() {
        let store = InMemoryObjectStore::new();
        let id = store.write_file(b"hello world").unwrap();
        assert_eq!(store.read_file(id).unwrap(), b"hello world");
        assert!(store.exists(&id.into()).unwrap());
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = InMemoryObjectStore::new();
        let id = ObjectId::from_hash([9; 32]);
        assert!(matches!(store.get(&id), Err(StoreError::NotFound(missing)) if missing == id));
        assert!(!store.exists(&id).unwrap());
    }

    #[test]
    fn put_is_idempotent() {
        let store = InMemoryObjectStore::new();
        let a = store.write_file(b"same").unwrap();
        let b = store.write_file(b"same").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn put_detects_integrity_conflict() {
        let store = InMemoryObjectStore::new();
        let obj = StoredObject::new(ObjectKind::File, b"real".to_vec());
        let id = obj.compute_id();
        store.overwrite_for_test(id, StoredObject::new(ObjectKind::File, b"forged".to_vec()));
        assert!(matches!(
            store.put(&obj),
            Err(StoreError::IntegrityConflict { id: bad }) if bad == id
        ));
    }

    #[test]
    fn typed_read_checks_kind() {
        let store = InMemoryObjectStore::new();
        let file = store.write_file(b"x").unwrap();
        let as_link = anvil_types::SymlinkId::new(file.into());
        assert!(matches!(
            store.read_symlink(as_link),
            Err(StoreError::KindMismatch { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // apply_batch
    // -----------------------------------------------------------------------

    #[test]
    fn batch_accepts_dependency_order() {
        let store = InMemoryObjectStore::new();
        let file = StoredObject::new(ObjectKind::File, b"content".to_vec());
        let mut tree = Tree::empty();
        tree.insert(
            "a.txt",
            TreeValue::File {
                id: file.compute_id().into(),
                executable: false,
            },
        )
        .unwrap();
        let tree_obj = tree.to_stored_object().unwrap();
        let commit = commit_on(tree_obj.compute_id().into(), vec![]);
        let commit_obj = commit.to_stored_object().unwrap();

        let batch = vec![entry(file), entry(tree_obj), entry(commit_obj.clone())];
        let ids = store.apply_batch(&batch).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(store.get(&commit_obj.compute_id()).unwrap(), commit_obj);
    }

    #[test]
    fn batch_rejects_forward_reference_and_writes_nothing() {
        let store = InMemoryObjectStore::new();
        let file = StoredObject::new(ObjectKind::File, b"content".to_vec());
        let mut tree = Tree::empty();
        tree.insert(
            "a.txt",
            TreeValue::File {
                id: file.compute_id().into(),
                executable: true,
            },
        )
        .unwrap();
        let tree_obj = tree.to_stored_object().unwrap();

        // Tree before the file it references.
        let batch = vec![entry(tree_obj), entry(file)];
        assert!(matches!(
            store.apply_batch(&batch),
            Err(StoreError::MissingReference { .. })
        ));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn batch_rejects_digest_mismatch() {
        let store = InMemoryObjectStore::new();
        let good = StoredObject::new(ObjectKind::File, b"one".to_vec());
        let batch = vec![
            entry(good),
            (ObjectId::from_hash([1; 32]), StoredObject::new(ObjectKind::File, b"two".to_vec())),
        ];
        assert!(matches!(
            store.apply_batch(&batch),
            Err(StoreError::DigestMismatch { .. })
        ));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn batch_rejects_dangling_operation_parent() {
        let store = InMemoryObjectStore::new();
        let view = View::empty().to_stored_object().unwrap();
        let op = Operation::new(
            view.compute_id().into(),
            vec![anvil_types::OperationId::new(ObjectId::from_hash([4; 32]))],
            OperationMetadata::now("push", "test"),
        );
        let batch = vec![entry(view), entry(op.to_stored_object().unwrap())];
        assert!(store.apply_batch(&batch).is_err());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn batch_rejects_view_naming_unknown_commit() {
        let store = InMemoryObjectStore::new();
        let mut view = View::empty();
        view.bookmarks.insert(
            "main".into(),
            RefTarget::conflicted(BTreeSet::from([
                anvil_types::CommitId::new(ObjectId::from_hash([5; 32])),
                anvil_types::CommitId::new(ObjectId::from_hash([6; 32])),
            ]))
            .unwrap(),
        );
        let batch = vec![entry(view.to_stored_object().unwrap())];
        assert!(matches!(
            store.apply_batch(&batch),
            Err(StoreError::MissingReference { .. })
        ));
    }

    #[test]
    fn batch_reapplied_is_noop() {
        let store = InMemoryObjectStore::new();
        let batch = vec![
            entry(StoredObject::new(ObjectKind::File, b"a".to_vec())),
            entry(StoredObject::new(ObjectKind::Symlink, b"a".to_vec())),
        ];
        store.apply_batch(&batch).unwrap();
        store.apply_batch(&batch).unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn put_is_deterministic_across_stores(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let a = InMemoryObjectStore::new();
            let b = InMemoryObjectStore::new();
            let id_a = a.write_file(&data).unwrap();
            let id_b = b.write_file(&data).unwrap();
            prop_assert_eq!(id_a, id_b);
        }

        #[test]
        fn repeated_puts_leave_one_object(data in proptest::collection::vec(any::<u8>(), 0..256), times in 1usize..5) {
            let store = InMemoryObjectStore::new();
            let first = store.write_file(&data).unwrap();
            for _ in 0..times {
                prop_assert_eq!(store.write_file(&data).unwrap(), first);
            }
            prop_assert_eq!(store.len().unwrap(), 1);
            prop_assert_eq!(store.read_file(first).unwrap(), data);
        }
    }
}
