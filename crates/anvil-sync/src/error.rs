use anvil_pack::PackError;
use anvil_protocol::{codes, AnvilMessage, ProtocolError};
use anvil_repo::RepoError;
use thiserror::Error;

use crate::state::SessionState;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("repository error: {0}")]
    Repo(#[from] RepoError),

    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    /// The peer reported an error and closed the exchange.
    #[error("remote error {code}: {message}")]
    Remote { code: u32, message: String },

    #[error("pack of more than {max} bytes refused")]
    PackTooLarge { max: usize },

    #[error("pack summary mismatch: {0}")]
    PackSummaryMismatch(String),

    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("push rejected: {0}")]
    Rejected(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Whether retrying the whole exchange may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Repo(e) => e.is_retryable(),
            SyncError::Remote { code, .. } => *code == codes::RACE_EXCEEDED,
            _ => false,
        }
    }

    /// Stable code for `Error` frames.
    pub fn code(&self) -> u32 {
        match self {
            SyncError::Protocol(e) => e.code(),
            SyncError::Repo(e) => e.code(),
            SyncError::Pack(e) if e.is_integrity() => codes::INTEGRITY,
            SyncError::Pack(_) => codes::INTERNAL,
            SyncError::Remote { code, .. } => *code,
            SyncError::PackTooLarge { .. } | SyncError::InvalidTransition { .. } => codes::PROTOCOL,
            SyncError::PackSummaryMismatch(_) => codes::INTEGRITY,
            SyncError::Rejected(_) => codes::REJECTED,
            SyncError::Task(_) => codes::INTERNAL,
        }
    }

    /// A frame arrived out of order. An `Error` frame carries the peer's own
    /// failure and is surfaced as [`SyncError::Remote`].
    pub(crate) fn unexpected(expected: &'static str, got: AnvilMessage) -> Self {
        match got {
            AnvilMessage::Error { code, message } => SyncError::Remote { code, message },
            other => ProtocolError::UnexpectedMessage {
                expected,
                got: other.type_name(),
            }
            .into(),
        }
    }

    /// Whether it is still worth telling the peer about this error.
    pub(crate) fn reportable(&self) -> bool {
        !matches!(
            self,
            SyncError::Protocol(ProtocolError::ConnectionClosed)
                | SyncError::Protocol(ProtocolError::Io(_))
                | SyncError::Remote { .. }
        )
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Task(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
