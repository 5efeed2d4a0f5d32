use std::net::SocketAddr;
use std::sync::Arc;

use anvil_protocol::{AnvilCodec, AnvilMessage};
use anvil_sync::{ReceiveHook, ServerSession, SessionSummary};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::auth::{require, Action, AllowAllAuth, AuthProvider, Credentials, Identity};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::hooks::{AuthorizingHook, LoggingHook};
use crate::registry::RepoRegistry;
use crate::router::build_router;

/// Anvil repository server: the framed sync listener plus the HTTP
/// endpoints. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct AnvilServer {
    config: Arc<ServerConfig>,
    registry: Arc<RepoRegistry>,
    auth: Arc<dyn AuthProvider>,
    hook: Arc<dyn ReceiveHook>,
}

impl AnvilServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(RepoRegistry::new(
            config.repos_root.clone(),
            config.head_install_retries,
        ));
        Self {
            config: Arc::new(config),
            registry,
            auth: Arc::new(AllowAllAuth),
            hook: Arc::new(LoggingHook),
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn ReceiveHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RepoRegistry> {
        &self.registry
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.registry.clone())
    }

    /// Bind both listeners and serve until one of them fails.
    pub async fn serve(self) -> ServerResult<()> {
        let sync = TcpListener::bind(self.config.sync_addr).await?;
        let http = TcpListener::bind(self.config.http_addr).await?;
        info!(
            sync = %self.config.sync_addr,
            http = %self.config.http_addr,
            root = %self.config.repos_root.display(),
            "anvil server listening"
        );
        tokio::try_join!(self.serve_sync(sync), self.serve_http(http))?;
        Ok(())
    }

    /// Serve the HTTP endpoints on `listener`.
    pub async fn serve_http(&self, listener: TcpListener) -> ServerResult<()> {
        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }

    /// Accept sync connections on `listener`, at most `max_connections` at
    /// a time, each on its own task.
    pub async fn serve_sync(&self, listener: TcpListener) -> ServerResult<()> {
        let permits = Arc::new(Semaphore::new(self.config.max_connections));
        loop {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ServerError::Internal(e.to_string()))?;
            let (mut socket, peer) = listener.accept().await?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(&mut socket, peer).await {
                    warn!(%peer, code = e.code(), error = %e, "connection ended with error");
                }
                drop(permit);
            });
        }
    }

    /// Run one sync connection: `Connect`, authentication, then a session
    /// against the named repository.
    pub async fn handle_connection<S>(&self, stream: &mut S, peer: SocketAddr) -> ServerResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (repo_name, identity, repo) = match self.accept(stream).await {
            Ok(accepted) => accepted,
            Err(e) => {
                let frame = AnvilMessage::Error {
                    code: e.code(),
                    message: e.to_string(),
                };
                if let Err(send_err) =
                    AnvilCodec::write_frame(stream, &frame, self.config.max_frame_size).await
                {
                    debug!(%peer, error = %send_err, "could not report error to peer");
                }
                return Err(e);
            }
        };
        debug!(%peer, repository = %repo_name, principal = %identity.name, "connection accepted");

        let hook = Arc::new(AuthorizingHook::new(
            self.auth.clone(),
            identity.clone(),
            self.hook.clone(),
        ));
        let session = ServerSession::new(repo, self.config.sync_config())
            .with_repository_name(repo_name.clone())
            .with_principal(identity.name.clone())
            .with_hook(hook);
        match session.run(stream).await? {
            SessionSummary::Idle => {
                debug!(%peer, repository = %repo_name, "peer left after handshake")
            }
            summary => debug!(%peer, repository = %repo_name, ?summary, "session finished"),
        }
        Ok(())
    }

    async fn accept<S>(
        &self,
        stream: &mut S,
    ) -> ServerResult<(String, Identity, Arc<anvil_repo::Repository>)>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let first = AnvilCodec::expect_frame(stream, self.config.max_frame_size).await?;
        let (repository, token) = match first {
            AnvilMessage::Connect { repository, token } => (repository, token),
            other => {
                return Err(anvil_protocol::ProtocolError::UnexpectedMessage {
                    expected: "Connect",
                    got: other.type_name(),
                }
                .into())
            }
        };

        let credentials = Credentials::from_token(token);
        if credentials == Credentials::Anonymous && !self.config.allow_anonymous {
            return Err(ServerError::AuthFailed("anonymous access is disabled".into()));
        }
        let identity = self.auth.authenticate(&credentials).await?;
        require(
            self.auth.as_ref(),
            &identity,
            Action::Read {
                repo: repository.clone(),
            },
        )
        .await?;

        let registry = self.registry.clone();
        let name = repository.clone();
        let repo = tokio::task::spawn_blocking(move || registry.open(&name))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?
            .map_err(|e| {
                if !matches!(e, ServerError::RepoNotFound(_)) {
                    error!(repository = %repository, error = %e, "failed to open repository");
                }
                e
            })?;
        Ok((repository, identity, repo))
    }
}
