use anvil_store::StoreError;
use anvil_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid pack magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("pack checksum mismatch")]
    ChecksumMismatch,

    #[error("pack declares {declared} objects but holds {actual}")]
    CountMismatch { declared: u32, actual: u32 },

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("CRC32 mismatch for object {id}")]
    CrcMismatch { id: ObjectId },

    /// The entry's bytes do not hash to the id it was sent under.
    #[error("digest mismatch: declared {declared}, computed {computed}")]
    DigestMismatch {
        declared: ObjectId,
        computed: ObjectId,
    },

    #[error("object of {size} bytes exceeds the {max} byte limit")]
    ObjectTooLarge { size: u64, max: u64 },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl PackError {
    /// Whether the pack content itself is bad, as opposed to a local failure
    /// while building or reading it.
    pub fn is_integrity(&self) -> bool {
        match self {
            PackError::Store(e) => e.is_integrity(),
            PackError::CompressionFailed(_) => false,
            _ => true,
        }
    }
}

pub type PackResult<T> = Result<T, PackError>;
