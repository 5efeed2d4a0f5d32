//! Commit signing keys.
//!
//! Signatures are made over a fixed context prefix followed by the commit's
//! unsigned canonical bytes, so a commit signature can never be replayed as
//! a signature over anything else the same key signs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prepended to every payload before signing.
pub const COMMIT_SIGNING_CONTEXT: &[u8] = b"anvil/commit-signature/v1\0";

const PUBLIC_KEY_LEN: usize = 32;
const SIGNATURE_LEN: usize = 64;
const FINGERPRINT_LEN: usize = 8;

/// Private half of a commit signing key.
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Public half, embedded in every signed commit.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

/// Detached signature over a commit payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

fn framed(payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(COMMIT_SIGNING_CONTEXT.len() + payload.len());
    message.extend_from_slice(COMMIT_SIGNING_CONTEXT);
    message.extend_from_slice(payload);
    message
}

impl SigningKey {
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()))
    }

    /// Deterministic key from a 32-byte seed.
    pub fn from_bytes(seed: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&seed))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// Sign the unsigned bytes of a commit.
    pub fn sign_commit(&self, payload: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.0.sign(&framed(payload)))
    }
}

impl VerifyingKey {
    /// Check `signature` against the unsigned bytes of a commit.
    pub fn verify_commit(&self, payload: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        use ed25519_dalek::Verifier;
        self.0
            .verify(&framed(payload), &signature.0)
            .map_err(|_| SignatureError::InvalidSignature)
    }

    /// Short key identifier shown next to verified commits: the first
    /// eight bytes of the key's BLAKE3 digest, in hex.
    pub fn fingerprint(&self) -> String {
        hex::encode(&blake3::hash(self.0.as_bytes()).as_bytes()[..FINGERPRINT_LEN])
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        let arr: [u8; PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidLength {
                expected: PUBLIC_KEY_LEN,
                actual: bytes.len(),
            })?;
        ed25519_dalek::VerifyingKey::from_bytes(&arr)
            .map(Self)
            .map_err(|_| SignatureError::InvalidKey)
    }
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        ed25519_dalek::Signature::from_slice(bytes)
            .map(Self)
            .map_err(|_| SignatureError::InvalidLength {
                expected: SIGNATURE_LEN,
                actual: bytes.len(),
            })
    }
}

/// Hex in human-readable formats (commits are stored as JSON), raw bytes
/// otherwise.
fn serialize_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
        serializer.serialize_str(&hex::encode(bytes))
    } else {
        serializer.serialize_bytes(bytes)
    }
}

fn deserialize_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    if deserializer.is_human_readable() {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    } else {
        <Vec<u8>>::deserialize(deserializer)
    }
}

impl Serialize for VerifyingKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_bytes(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyingKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Self::from_slice(&deserialize_bytes(deserializer)?).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_bytes(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Self::from_slice(&deserialize_bytes(deserializer)?).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SigningKey")
            .field(&self.verifying_key().fingerprint())
            .finish()
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", self.fingerprint())
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.to_bytes()[..FINGERPRINT_LEN]))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature does not match the commit")]
    InvalidSignature,
    #[error("not a valid ed25519 public key")]
    InvalidKey,
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
