use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{decode_fixed, TypeError};

/// Length of a change id, in bytes.
pub const CHANGE_ID_LEN: usize = 16;

/// Identity of a logical change.
///
/// Assigned once, at random, when a change is first created, and carried
/// unchanged through every amendment or rebase of the commit. It is never
/// derived from commit content, so two rewrites of the same change share a
/// `ChangeId` while having different commit ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeId([u8; CHANGE_ID_LEN]);

impl ChangeId {
    /// Generate a fresh random change id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; CHANGE_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; CHANGE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; CHANGE_ID_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 32-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        decode_fixed::<CHANGE_ID_LEN>(s).map(Self)
    }
}

impl fmt::Debug for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeId({})", self.short_hex())
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ChangeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for ChangeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = if deserializer.is_human_readable() {
            decode_fixed::<CHANGE_ID_LEN>(&String::deserialize(deserializer)?)
        } else {
            let raw = <Vec<u8>>::deserialize(deserializer)?;
            raw.as_slice().try_into().map_err(|_| TypeError::InvalidLength {
                expected: CHANGE_ID_LEN,
                actual: raw.len(),
            })
        };
        bytes.map(Self).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_differ() {
        assert_ne!(ChangeId::generate(), ChangeId::generate());
    }

    #[test]
    fn hex_roundtrip() {
        let id = ChangeId::from_bytes([0xc3; 16]);
        assert_eq!(id.to_hex().len(), 32);
        assert_eq!(ChangeId::from_hex(&id.to_hex()).unwrap(), id);
    }

    #[test]
    fn rejects_object_length_hex() {
        let err = ChangeId::from_hex(&"00".repeat(32)).unwrap_err();
        assert_eq!(err, TypeError::InvalidLength { expected: 16, actual: 32 });
    }

    #[test]
    fn serializes_as_hex_in_json() {
        let id = ChangeId::from_bytes([0x01; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(16)));
        assert_eq!(serde_json::from_str::<ChangeId>(&json).unwrap(), id);
    }
}
