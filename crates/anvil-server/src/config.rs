use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anvil_sync::{SyncConfig, DEFAULT_MAX_PACK_SIZE, DEFAULT_PACK_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Server settings, usually read from a TOML file. Missing keys take their
/// defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Where the framed sync protocol is served.
    pub sync_addr: SocketAddr,
    /// Where health and info endpoints are served.
    pub http_addr: SocketAddr,
    /// Directory holding one repository per subdirectory.
    pub repos_root: PathBuf,
    pub max_frame_size: usize,
    pub max_pack_size: usize,
    pub pack_chunk_size: usize,
    /// Compare-and-swap attempts when installing pushed heads.
    pub head_install_retries: u32,
    /// Concurrent sync connections.
    pub max_connections: usize,
    /// Accept connections that present no token.
    pub allow_anonymous: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sync_addr: SocketAddr::from(([127, 0, 0, 1], 9418)),
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            repos_root: PathBuf::from("."),
            max_frame_size: anvil_protocol::DEFAULT_MAX_FRAME_SIZE,
            max_pack_size: DEFAULT_MAX_PACK_SIZE,
            pack_chunk_size: DEFAULT_PACK_CHUNK_SIZE,
            head_install_retries: 8,
            max_connections: 256,
            allow_anonymous: true,
        }
    }
}

impl ServerConfig {
    /// Read a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ServerResult<()> {
        if self.max_connections == 0 {
            return Err(ServerError::Config("max_connections must be at least 1".into()));
        }
        if self.head_install_retries == 0 {
            return Err(ServerError::Config("head_install_retries must be at least 1".into()));
        }
        if self.pack_chunk_size == 0 || self.max_frame_size == 0 {
            return Err(ServerError::Config("frame and chunk sizes must be non-zero".into()));
        }
        Ok(())
    }

    /// Protocol limits for sessions served under this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            max_frame_size: self.max_frame_size,
            max_pack_size: self.max_pack_size,
            pack_chunk_size: self.pack_chunk_size,
            ..SyncConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.sync_addr, "127.0.0.1:9418".parse::<SocketAddr>().unwrap());
        assert_eq!(c.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(c.max_pack_size, 256 * 1024 * 1024);
        assert_eq!(c.pack_chunk_size, 1024 * 1024);
        assert_eq!(c.head_install_retries, 8);
        assert_eq!(c.max_connections, 256);
        assert!(c.allow_anonymous);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let c = ServerConfig::from_toml_str(
            r#"
            repos_root = "/srv/anvil"
            allow_anonymous = false
            max_pack_size = 1048576
            "#,
        )
        .unwrap();
        assert_eq!(c.repos_root, PathBuf::from("/srv/anvil"));
        assert!(!c.allow_anonymous);
        assert_eq!(c.max_pack_size, 1 << 20);
        assert_eq!(c.max_connections, 256);
        assert_eq!(c.sync_config().max_pack_size, 1 << 20);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ServerConfig::from_toml_str("max_connections = 0"),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(
            ServerConfig::from_toml_str("sync_addr = 12"),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anvil.toml");
        std::fs::write(&path, "sync_addr = \"0.0.0.0:7000\"\n").unwrap();
        let c = ServerConfig::load(&path).unwrap();
        assert_eq!(c.sync_addr.port(), 7000);

        let missing = ServerConfig::load(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ServerError::Io(_))));
    }
}
