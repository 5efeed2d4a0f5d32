//! Wire protocol for Anvil sync.
//!
//! Every message travels in one frame: `[u32 BE length][u8 type tag][bincode
//! payload]`, where the length counts the tag byte and the payload. Frames
//! longer than the configured maximum are refused from the header alone.
//!
//! # Key Types
//!
//! - [`AnvilMessage`]: every message a client or server can send
//! - [`AnvilCodec`]: frame encode/decode, plus async read/write helpers
//! - [`capabilities`]: capability names and handshake checks

pub mod capabilities;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod message;

pub use capabilities::{check_hello, local_capabilities, REQUIRED_CAPABILITIES};
pub use codec::{AnvilCodec, FRAME_HEADER_LEN};
pub use endpoint::{endpoints, HealthResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    codes, AnvilMessage, PushStatus, RefResult, DEFAULT_MAX_FRAME_SIZE, PROTOCOL_VERSION,
};
