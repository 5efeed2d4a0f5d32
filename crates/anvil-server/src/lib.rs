//! Hosting server for Anvil.
//!
//! Serves the framed sync protocol over TCP for every repository under one
//! root directory, plus a small HTTP surface for health checks and
//! operational tooling.
//!
//! # Key Types
//!
//! - [`AnvilServer`]: the listeners and per-connection handling
//! - [`ServerConfig`]: TOML-backed settings
//! - [`RepoRegistry`]: lazily opened, shared repositories
//! - [`AuthProvider`]: authentication and authorization seam

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod registry;
pub mod router;
pub mod server;

pub use auth::{Action, AllowAllAuth, AuthProvider, Credentials, Identity};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use hooks::{AuthorizingHook, LoggingHook};
pub use registry::RepoRegistry;
pub use server::AnvilServer;

pub use anvil_sync::ReceiveHook;
