use anvil_crypto::ContentHasher;
use anvil_types::ObjectId;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum ObjectKind {
    Commit,
    Tree,
    File,
    Symlink,
    View,
    Operation,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 6] = [
        ObjectKind::Commit,
        ObjectKind::Tree,
        ObjectKind::File,
        ObjectKind::Symlink,
        ObjectKind::View,
        ObjectKind::Operation,
    ];

    /// One-byte tag used on disk and in packs.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::File => 3,
            Self::Symlink => 4,
            Self::View => 5,
            Self::Operation => 6,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// Directory the object lives in on disk. Symlink targets share `files/`
    /// with file contents, views share `operations/` with operations.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Commit => "commits",
            Self::Tree => "trees",
            Self::File | Self::Symlink => "files",
            Self::View | Self::Operation => "operations",
        }
    }

    pub fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Commit => &ContentHasher::COMMIT,
            Self::Tree => &ContentHasher::TREE,
            Self::File => &ContentHasher::FILE,
            Self::Symlink => &ContentHasher::SYMLINK,
            Self::View => &ContentHasher::VIEW,
            Self::Operation => &ContentHasher::OPERATION,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::File => "file",
            Self::Symlink => "symlink",
            Self::View => "view",
            Self::Operation => "operation",
        };
        f.write_str(name)
    }
}

/// A stored object: kind tag plus canonical bytes.
///
/// `StoredObject` is the unit of storage and of pack transfer. Its id is the
/// kind's domain-separated digest of `data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Compute the content-addressed id of this object.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.data)
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Ids this object requires to be present in the store. Commit
    /// predecessors are informational and not included.
    pub fn references(&self) -> StoreResult<Vec<ObjectId>> {
        Ok(match self.kind {
            ObjectKind::File | ObjectKind::Symlink => Vec::new(),
            ObjectKind::Tree => crate::tree::Tree::from_stored_object(self)?.references(),
            ObjectKind::Commit => crate::commit::Commit::from_stored_object(self)?.references(),
            ObjectKind::View => crate::operation::View::from_stored_object(self)?.references(),
            ObjectKind::Operation => {
                crate::operation::Operation::from_stored_object(self)?.references()
            }
        })
    }
}

/// A structured object with a canonical JSON encoding.
///
/// Field order is fixed by the struct definitions and every map is a
/// `BTreeMap`, so equal values always encode to equal bytes.
pub trait StoreObject: Serialize + DeserializeOwned {
    const KIND: ObjectKind;

    /// The typed id this object is addressed by.
    type Id: From<ObjectId> + Into<ObjectId> + Copy;

    fn to_stored_object(&self) -> StoreResult<StoredObject> {
        Ok(StoredObject::new(Self::KIND, serde_json::to_vec(self)?))
    }

    fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != Self::KIND {
            return Err(StoreError::KindMismatch {
                id: obj.compute_id(),
                expected: Self::KIND,
                actual: obj.kind,
            });
        }
        serde_json::from_slice(&obj.data).map_err(|e| StoreError::CorruptObject {
            id: obj.compute_id(),
            reason: e.to_string(),
        })
    }

    /// Compute the typed id without writing the object anywhere.
    fn compute_id(&self) -> StoreResult<Self::Id> {
        Ok(self.to_stored_object()?.compute_id().into())
    }
}
