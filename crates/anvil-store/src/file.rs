use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anvil_types::ObjectId;
use tracing::debug;

use crate::batch::validate_batch;
use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

/// Directory-backed object store.
///
/// Layout under `root`:
/// ```text
/// commits/<hex>      commit objects
/// trees/<hex>        tree objects
/// files/<hex>        file contents and symlink targets
/// operations/<hex>   operations and views
/// ```
/// Each file holds one kind tag byte followed by the object's canonical
/// bytes. Objects are written to a temp file in the target directory and
/// renamed into place, so a reader sees either nothing or the whole object.
#[derive(Debug)]
pub struct FileObjectStore {
    root: PathBuf,
}

const NAMESPACES: [&str; 4] = ["commits", "trees", "files", "operations"];

impl FileObjectStore {
    /// Create the directory layout (if needed) and open the store.
    pub fn init(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        for ns in NAMESPACES {
            fs::create_dir_all(root.join(ns))?;
        }
        debug!(root = %root.display(), "initialized object store");
        Ok(Self { root })
    }

    /// Open an existing store; every namespace directory must be present.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        for ns in NAMESPACES {
            let dir = root.join(ns);
            if !dir.is_dir() {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("missing store directory {}", dir.display()),
                )));
            }
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, kind: ObjectKind, id: &ObjectId) -> PathBuf {
        self.root.join(kind.namespace()).join(id.to_hex())
    }

    /// Find an object's file without knowing its kind.
    fn locate(&self, id: &ObjectId) -> Option<PathBuf> {
        let name = id.to_hex();
        NAMESPACES
            .iter()
            .map(|ns| self.root.join(ns).join(&name))
            .find(|p| p.is_file())
    }

    fn read_path(&self, id: &ObjectId, path: &Path) -> StoreResult<StoredObject> {
        let bytes = fs::read(path)?;
        let (tag, data) = bytes.split_first().ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: "empty object file".into(),
        })?;
        let kind = ObjectKind::from_tag(*tag).ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: format!("unknown kind tag {tag}"),
        })?;
        let object = StoredObject::new(kind, data.to_vec());
        let computed = object.compute_id();
        if computed != *id {
            return Err(StoreError::CorruptObject {
                id: *id,
                reason: format!("content hashes to {computed}"),
            });
        }
        Ok(object)
    }

    fn write_new(&self, id: &ObjectId, object: &StoredObject) -> StoreResult<()> {
        let path = self.object_path(object.kind, id);
        let dir = self.root.join(object.kind.namespace());
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&[object.kind.tag()])?;
        tmp.write_all(&object.data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(id = %id.short_hex(), kind = %object.kind, "wrote object");
        Ok(())
    }
}

impl ObjectStore for FileObjectStore {
    fn try_get(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        match self.locate(id) {
            Some(path) => self.read_path(id, &path).map(Some),
            None => Ok(None),
        }
    }

    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        let path = self.object_path(object.kind, &id);
        if path.is_file() {
            return match self.read_path(&id, &path) {
                Ok(existing) if existing == *object => Ok(id),
                Ok(_) | Err(StoreError::CorruptObject { .. }) => {
                    Err(StoreError::IntegrityConflict { id })
                }
                Err(e) => Err(e),
            };
        }
        self.write_new(&id, object)?;
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.locate(id).is_some())
    }

    fn apply_batch(&self, objects: &[(ObjectId, StoredObject)]) -> StoreResult<Vec<ObjectId>> {
        let to_write = validate_batch(
            objects,
            |id| match self.try_get(id) {
                Err(StoreError::CorruptObject { id, .. }) => {
                    Err(StoreError::IntegrityConflict { id })
                }
                other => other,
            },
            |id| self.exists(id),
        )?;
        for index in to_write {
            let (id, object) = &objects[index];
            self.write_new(id, object)?;
        }
        Ok(objects.iter().map(|(id, _)| *id).collect())
    }
}
