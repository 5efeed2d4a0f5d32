use std::sync::Arc;

use anvil_types::{FileId, ObjectId, SymlinkId};

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoreObject, StoredObject};

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; there is no delete.
/// - `put` of bytes already present is a no-op. `put` of different bytes
///   under an id that is already taken fails with
///   [`StoreError::IntegrityConflict`].
/// - `apply_batch` writes either every object of a batch or, when any of
///   them fails validation, none of them.
/// - Concurrent reads are always safe.
pub trait ObjectStore: Send + Sync {
    /// Read an object, returning `Ok(None)` if it does not exist.
    fn try_get(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed id.
    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Whether an object exists. Missing ids are `Ok(false)`, never an error.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Validate and write a batch of `(declared id, object)` pairs.
    ///
    /// Every reference an object makes must resolve either in the store or
    /// to an object earlier in the same batch. Returns the ids in batch order.
    fn apply_batch(&self, objects: &[(ObjectId, StoredObject)]) -> StoreResult<Vec<ObjectId>>;

    /// Read an object, failing with [`StoreError::NotFound`] if absent.
    fn get(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        self.try_get(id)?.ok_or(StoreError::NotFound(*id))
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn try_get(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        (**self).try_get(id)
    }

    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        (**self).put(object)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        (**self).exists(id)
    }

    fn apply_batch(&self, objects: &[(ObjectId, StoredObject)]) -> StoreResult<Vec<ObjectId>> {
        (**self).apply_batch(objects)
    }
}

/// Typed convenience layer over any [`ObjectStore`].
pub trait ObjectStoreExt: ObjectStore {
    fn write_object<T: StoreObject>(&self, object: &T) -> StoreResult<T::Id> {
        Ok(self.put(&object.to_stored_object()?)?.into())
    }

    fn read_object<T: StoreObject>(&self, id: T::Id) -> StoreResult<T> {
        T::from_stored_object(&self.get(&id.into())?)
    }

    fn write_file(&self, contents: &[u8]) -> StoreResult<FileId> {
        let obj = StoredObject::new(ObjectKind::File, contents.to_vec());
        Ok(self.put(&obj)?.into())
    }

    fn read_file(&self, id: FileId) -> StoreResult<Vec<u8>> {
        Ok(self.read_raw(id.into(), ObjectKind::File)?.data)
    }

    fn write_symlink(&self, target: &str) -> StoreResult<SymlinkId> {
        let obj = StoredObject::new(ObjectKind::Symlink, target.as_bytes().to_vec());
        Ok(self.put(&obj)?.into())
    }

    fn read_symlink(&self, id: SymlinkId) -> StoreResult<String> {
        let id: ObjectId = id.into();
        let obj = self.read_raw(id, ObjectKind::Symlink)?;
        String::from_utf8(obj.data).map_err(|e| StoreError::CorruptObject {
            id,
            reason: e.to_string(),
        })
    }

    /// Read an object and check it has the expected kind.
    fn read_raw(&self, id: ObjectId, kind: ObjectKind) -> StoreResult<StoredObject> {
        let obj = self.get(&id)?;
        if obj.kind != kind {
            return Err(StoreError::KindMismatch {
                id,
                expected: kind,
                actual: obj.kind,
            });
        }
        Ok(obj)
    }
}

impl<S: ObjectStore + ?Sized> ObjectStoreExt for S {}
