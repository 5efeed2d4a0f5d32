use anvil_store::{ObjectKind, StoredObject};
use anvil_types::ObjectId;
use tracing::debug;

use crate::entry::{PackEntry, PackSummary, HEADER_LEN, PACK_MAGIC, PACK_VERSION, TRAILER_LEN};
use crate::error::{PackError, PackResult};
use crate::writer::decode_varint;

/// Default per-object size limit after decompression (64 MiB).
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 64 * 1024 * 1024;

/// Parses and verifies a complete pack.
///
/// Everything is checked before any entry is returned: magic, version,
/// trailing checksum, per-entry CRC and size, and that each object's digest
/// equals the id it was sent under.
#[derive(Debug, Clone)]
pub struct PackReader {
    max_object_size: u64,
}

impl Default for PackReader {
    fn default() -> Self {
        Self {
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
        }
    }
}

impl PackReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_object_size(mut self, max: u64) -> Self {
        self.max_object_size = max;
        self
    }

    /// Checksum and object count from the header and trailer, without
    /// decoding entries.
    pub fn summary(&self, pack: &[u8]) -> PackResult<PackSummary> {
        let count = check_header(pack)?;
        let body_end = pack.len() - TRAILER_LEN;
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&pack[body_end..]);
        Ok(PackSummary {
            object_count: count,
            checksum,
        })
    }

    /// Decode every entry, in pack order.
    pub fn read_all(&self, pack: &[u8]) -> PackResult<Vec<PackEntry>> {
        let summary = self.summary(pack)?;
        let body_end = pack.len() - TRAILER_LEN;
        if *blake3::hash(&pack[..body_end]).as_bytes() != summary.checksum {
            return Err(PackError::ChecksumMismatch);
        }

        let mut entries = Vec::with_capacity(summary.object_count.min(1 << 16) as usize);
        let mut pos = HEADER_LEN;
        while pos < body_end {
            let (entry, next) = self.read_entry(&pack[..body_end], pos)?;
            entries.push(entry);
            pos = next;
        }

        let actual = entries.len() as u32;
        if actual != summary.object_count {
            return Err(PackError::CountMismatch {
                declared: summary.object_count,
                actual,
            });
        }
        debug!(objects = actual, bytes = pack.len(), "read pack");
        Ok(entries)
    }

    fn read_entry(&self, data: &[u8], start: usize) -> PackResult<(PackEntry, usize)> {
        let offset = start as u64;
        let corrupt = |reason: &str| PackError::CorruptEntry {
            offset,
            reason: reason.into(),
        };

        let mut pos = start;
        let tag = *data.get(pos).ok_or_else(|| corrupt("missing type byte"))?;
        let kind = ObjectKind::from_tag(tag)
            .ok_or_else(|| corrupt(&format!("unknown type byte: {tag}")))?;
        pos += 1;

        let id_bytes = data
            .get(pos..pos + 32)
            .ok_or_else(|| corrupt("truncated object id"))?;
        let id = ObjectId::from_slice(id_bytes).map_err(|e| corrupt(&e.to_string()))?;
        pos += 32;

        let (size, consumed) = decode_varint(&data[pos..], offset)?;
        pos += consumed;
        if size > self.max_object_size {
            return Err(PackError::ObjectTooLarge {
                size,
                max: self.max_object_size,
            });
        }
        let (compressed_size, consumed) = decode_varint(&data[pos..], offset)?;
        pos += consumed;

        let end = usize::try_from(compressed_size)
            .ok()
            .and_then(|n| pos.checked_add(n))
            .filter(|end| end.checked_add(4).is_some_and(|crc_end| crc_end <= data.len()))
            .ok_or_else(|| corrupt("compressed data extends beyond pack"))?;
        let compressed = &data[pos..end];
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&data[end..end + 4]);
        if crc32fast::hash(compressed) != u32::from_be_bytes(crc) {
            return Err(PackError::CrcMismatch { id });
        }

        // `size` is bounded above, so this allocation is too.
        let decompressed = zstd::bulk::decompress(compressed, size as usize)
            .map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
        if decompressed.len() as u64 != size {
            return Err(corrupt(&format!(
                "size mismatch: expected {size}, got {}",
                decompressed.len()
            )));
        }

        let object = StoredObject::new(kind, decompressed);
        let computed = object.compute_id();
        if computed != id {
            return Err(PackError::DigestMismatch {
                declared: id,
                computed,
            });
        }
        Ok((PackEntry::new(id, object), end + 4))
    }
}

fn check_header(pack: &[u8]) -> PackResult<u32> {
    if pack.len() < HEADER_LEN + TRAILER_LEN {
        return Err(PackError::CorruptEntry {
            offset: 0,
            reason: "pack data too short".into(),
        });
    }
    if &pack[0..4] != PACK_MAGIC {
        return Err(PackError::InvalidMagic {
            expected: String::from_utf8_lossy(PACK_MAGIC).into(),
            actual: String::from_utf8_lossy(&pack[0..4]).into(),
        });
    }
    let mut word = [0u8; 4];
    word.copy_from_slice(&pack[4..8]);
    let version = u32::from_be_bytes(word);
    if version != PACK_VERSION {
        return Err(PackError::UnsupportedVersion(version));
    }
    word.copy_from_slice(&pack[8..12]);
    Ok(u32::from_be_bytes(word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::PackWriter;

    fn file(content: &[u8]) -> StoredObject {
        StoredObject::new(ObjectKind::File, content.to_vec())
    }

    fn build(objects: Vec<StoredObject>) -> Vec<u8> {
        let mut writer = PackWriter::new();
        for obj in objects {
            writer.add_object(obj);
        }
        writer.finish().unwrap().0
    }

    #[test]
    fn roundtrip_preserves_order_and_ids() {
        let objects: Vec<StoredObject> = (0..10)
            .map(|i| file(format!("object-{i}").as_bytes()))
            .collect();
        let pack = build(objects.clone());
        let entries = PackReader::new().read_all(&pack).unwrap();
        assert_eq!(entries.len(), 10);
        for (entry, original) in entries.iter().zip(&objects) {
            assert_eq!(entry.id, original.compute_id());
            assert_eq!(&entry.object, original);
        }
    }

    #[test]
    fn bad_magic() {
        let mut pack = build(vec![file(b"x")]);
        pack[0] = b'X';
        assert!(matches!(
            PackReader::new().read_all(&pack),
            Err(PackError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn bad_version() {
        let mut pack = build(vec![]);
        pack[7] = 9;
        assert!(matches!(
            PackReader::new().read_all(&pack),
            Err(PackError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut pack = build(vec![file(b"some content here")]);
        let mid = HEADER_LEN + 40;
        pack[mid] ^= 0xff;
        assert!(matches!(
            PackReader::new().read_all(&pack),
            Err(PackError::ChecksumMismatch)
        ));
    }

    #[test]
    fn wrong_declared_id_is_digest_mismatch() {
        let mut writer = PackWriter::new();
        writer.add_entry(PackEntry::new(ObjectId::from_hash([7; 32]), file(b"payload")));
        let (pack, _) = writer.finish().unwrap();
        let err = PackReader::new().read_all(&pack).unwrap_err();
        assert!(matches!(err, PackError::DigestMismatch { .. }));
        assert!(err.is_integrity());
    }

    #[test]
    fn oversized_object_rejected() {
        let pack = build(vec![file(&[0u8; 4096])]);
        assert!(matches!(
            PackReader::new().with_max_object_size(1024).read_all(&pack),
            Err(PackError::ObjectTooLarge { size: 4096, max: 1024 })
        ));
    }

    #[test]
    fn truncated_pack() {
        let pack = build(vec![file(b"abc")]);
        assert!(PackReader::new().read_all(&pack[..20]).is_err());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn huge_compressed_size_is_corrupt_not_a_panic() {
        // Header plus one entry: kind, id, size 1, then a compressed size
        // that lands four bytes short of the end of the address space.
        let mut pack = Vec::new();
        pack.extend_from_slice(PACK_MAGIC);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&1u32.to_be_bytes());
        pack.push(ObjectKind::File.tag());
        pack.extend_from_slice(&[0u8; 32]);
        crate::writer::encode_varint(&mut pack, 1);
        let data_start = pack.len() + 10;
        crate::writer::encode_varint(&mut pack, (usize::MAX - data_start - 1) as u64);
        assert_eq!(pack.len(), data_start);
        pack.extend_from_slice(&[0u8; 8]);
        let checksum = *blake3::hash(&pack).as_bytes();
        pack.extend_from_slice(&checksum);

        assert!(matches!(
            PackReader::new().read_all(&pack),
            Err(PackError::CorruptEntry { .. })
        ));
    }

    #[test]
    fn summary_matches_writer() {
        let mut writer = PackWriter::new();
        writer.add_object(file(b"a"));
        writer.add_object(file(b"b"));
        let (pack, summary) = writer.finish().unwrap();
        assert_eq!(PackReader::new().summary(&pack).unwrap(), summary);
    }
}
