use anvil_store::{ObjectKind, StoredObject};
use anvil_types::ObjectId;

/// Magic bytes at the start of every pack.
pub const PACK_MAGIC: &[u8; 4] = b"AVPK";

/// Current pack format version.
pub const PACK_VERSION: u32 = 1;

/// Header: magic + version + object count.
pub const HEADER_LEN: usize = 12;

/// Trailer: BLAKE3 checksum of everything before it.
pub const TRAILER_LEN: usize = 32;

/// A single object in a pack, with the id it was sent under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackEntry {
    pub id: ObjectId,
    pub object: StoredObject,
}

impl PackEntry {
    pub fn new(id: ObjectId, object: StoredObject) -> Self {
        Self { id, object }
    }

    /// Entry for an object under its own digest.
    pub fn from_object(object: StoredObject) -> Self {
        Self {
            id: object.compute_id(),
            object,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.object.kind
    }

    pub fn into_pair(self) -> (ObjectId, StoredObject) {
        (self.id, self.object)
    }
}

/// Summary of a finished pack, sent in `PackEnd`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackSummary {
    pub object_count: u32,
    pub checksum: [u8; 32],
}
