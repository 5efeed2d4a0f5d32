use std::collections::HashSet;

use anvil_store::StoredObject;
use anvil_types::ObjectId;
use tracing::debug;

use crate::entry::{PackEntry, PackSummary, PACK_MAGIC, PACK_VERSION};
use crate::error::{PackError, PackResult};

/// zstd level used for pack entries.
const COMPRESSION_LEVEL: i32 = 3;

/// Builds a pack stream from objects, in the order they are added.
///
/// On-wire layout:
/// ```text
/// "AVPK" | version u32 BE | count u32 BE
/// per entry: kind tag u8 | id [32] | varint size | varint compressed size
///            | zstd data | crc32 u32 BE (of the compressed data)
/// BLAKE3 checksum [32] of everything above
/// ```
#[derive(Debug, Default)]
pub struct PackWriter {
    entries: Vec<PackEntry>,
    seen: HashSet<ObjectId>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an object under its digest. Duplicates are dropped.
    pub fn add_object(&mut self, object: StoredObject) {
        self.add_entry(PackEntry::from_object(object));
    }

    /// Queue an entry as-is. Duplicates (by id) are dropped.
    pub fn add_entry(&mut self, entry: PackEntry) {
        if self.seen.insert(entry.id) {
            self.entries.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the pack.
    pub fn finish(self) -> PackResult<(Vec<u8>, PackSummary)> {
        let count = u32::try_from(self.entries.len()).map_err(|_| {
            PackError::CompressionFailed(format!("too many objects: {}", self.entries.len()))
        })?;

        let mut pack = Vec::new();
        pack.extend_from_slice(PACK_MAGIC);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&count.to_be_bytes());

        for entry in &self.entries {
            pack.push(entry.object.kind.tag());
            pack.extend_from_slice(entry.id.as_bytes());

            let compressed = zstd::encode_all(entry.object.data.as_slice(), COMPRESSION_LEVEL)
                .map_err(|e| PackError::CompressionFailed(e.to_string()))?;
            encode_varint(&mut pack, entry.object.data.len() as u64);
            encode_varint(&mut pack, compressed.len() as u64);
            pack.extend_from_slice(&compressed);
            pack.extend_from_slice(&crc32fast::hash(&compressed).to_be_bytes());
        }

        let checksum = *blake3::hash(&pack).as_bytes();
        pack.extend_from_slice(&checksum);

        debug!(objects = count, bytes = pack.len(), "built pack");
        Ok((
            pack,
            PackSummary {
                object_count: count,
                checksum,
            },
        ))
    }
}

/// Encode a u64 as a variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer. Returns (value, bytes_consumed).
pub(crate) fn decode_varint(data: &[u8], offset: u64) -> PackResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            break;
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(PackError::CorruptEntry {
        offset,
        reason: if shift >= 64 {
            "varint overflow".into()
        } else {
            "truncated varint".into()
        },
    })
}
