//! Pack streams for Anvil sync.
//!
//! A pack is a self-verifying sequence of objects exchanged during fetch and
//! push: zstd-compressed entries, each with a CRC32 and the id it claims,
//! followed by a BLAKE3 checksum of the whole stream.
//!
//! # Architecture
//!
//! - [`ObjectCollector`]: picks the objects a peer is missing and orders them
//!   so that every reference points backwards
//! - [`PackWriter`]: serializes entries into pack bytes
//! - [`PackReader`]: verifies and decodes pack bytes, including every
//!   object's digest against its declared id

pub mod collect;
pub mod entry;
pub mod error;
pub mod reader;
pub mod writer;

pub use collect::ObjectCollector;
pub use entry::{PackEntry, PackSummary, PACK_MAGIC, PACK_VERSION};
pub use error::{PackError, PackResult};
pub use reader::{PackReader, DEFAULT_MAX_OBJECT_SIZE};
pub use writer::PackWriter;
