use thiserror::Error;

use crate::message::codes;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("framing error: {0}")]
    FramingError(String),

    #[error("version mismatch: local {local}, remote {remote}")]
    VersionMismatch { local: u32, remote: u32 },

    #[error("missing required capability: {0}")]
    MissingCapability(String),

    #[error("unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage { expected: &'static str, got: &'static str },

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("remote error: code={code}, message={message}")]
    RemoteError { code: u32, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Wire code reported in an `Error` frame.
    pub fn code(&self) -> u32 {
        match self {
            ProtocolError::RemoteError { code, .. } => *code,
            ProtocolError::Io(_) | ProtocolError::ConnectionClosed => codes::INTERNAL,
            _ => codes::PROTOCOL,
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
