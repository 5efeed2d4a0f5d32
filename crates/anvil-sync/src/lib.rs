//! Sync engine for Anvil.
//!
//! Runs fetch and push sessions over any `AsyncRead + AsyncWrite` stream.
//! A session opens with a `Hello` exchange, carries exactly one request and
//! then closes. Objects travel as a pack split into `PackData` chunks and
//! sealed by a `PackEnd` carrying the pack's object count and checksum.
//!
//! A push never overwrites concurrent work: the server stores the pushed
//! operations, merges them with its own heads and installs the result with
//! a bounded compare-and-swap loop.
//!
//! # Key Types
//!
//! - [`ClientSession`]: fetches into and pushes from a local repository
//! - [`ServerSession`]: serves one session against a shared repository
//! - [`ReceiveHook`]: pre- and post-receive extension points
//! - [`SessionState`]: the session lifecycle
//! - [`SyncConfig`]: frame, pack and advertisement limits

pub mod client;
pub mod config;
pub mod error;
pub mod hooks;
pub mod negotiation;
pub mod server;
pub mod state;
pub mod transfer;

pub use client::{ClientSession, FetchSummary, PushSummary};
pub use config::{SyncConfig, DEFAULT_ADVERTISE_LIMIT, DEFAULT_MAX_PACK_SIZE, DEFAULT_PACK_CHUNK_SIZE};
pub use error::{SyncError, SyncResult};
pub use hooks::{HookDecision, NoOpHook, PushContext, PushNotification, ReceiveHook};
pub use server::{ServerSession, SessionSummary};
pub use state::SessionState;
