//! Cryptographic primitives for Anvil.
//!
//! Provides domain-separated BLAKE3 hashing for every stored object kind and
//! Ed25519 signing/verification for optional commit signatures.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod hasher;
pub mod signer;

pub use hasher::ContentHasher;
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey, COMMIT_SIGNING_CONTEXT};
