use anvil_pack::DEFAULT_MAX_OBJECT_SIZE;
use anvil_protocol::DEFAULT_MAX_FRAME_SIZE;

/// Limits applied to one sync session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Largest frame accepted or sent, tag byte included.
    pub max_frame_size: usize,
    /// Largest pack accepted, summed over all `PackData` chunks.
    pub max_pack_size: usize,
    /// Size of the `PackData` chunks we send.
    pub pack_chunk_size: usize,
    /// Largest single object inside a pack.
    pub max_object_size: u64,
    /// How many operations a client advertises when looking for shared
    /// history.
    pub advertise_limit: usize,
}

pub const DEFAULT_MAX_PACK_SIZE: usize = 256 * 1024 * 1024;
pub const DEFAULT_PACK_CHUNK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_ADVERTISE_LIMIT: usize = 256;

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_pack_size: DEFAULT_MAX_PACK_SIZE,
            pack_chunk_size: DEFAULT_PACK_CHUNK_SIZE,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            advertise_limit: DEFAULT_ADVERTISE_LIMIT,
        }
    }
}

impl SyncConfig {
    /// Chunk size clamped so a `PackData` frame always fits in a frame.
    pub(crate) fn effective_chunk_size(&self) -> usize {
        // bincode adds a variant index and a length prefix around the chunk.
        const ENVELOPE: usize = 1 + 4 + 8;
        self.pack_chunk_size
            .min(self.max_frame_size.saturating_sub(ENVELOPE))
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = SyncConfig::default();
        assert_eq!(c.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(c.max_pack_size, 256 * 1024 * 1024);
        assert_eq!(c.pack_chunk_size, 1024 * 1024);
    }

    #[test]
    fn chunks_never_exceed_frames() {
        let c = SyncConfig {
            max_frame_size: 64,
            pack_chunk_size: 1024,
            ..SyncConfig::default()
        };
        assert!(c.effective_chunk_size() + 13 <= 64);
    }
}
