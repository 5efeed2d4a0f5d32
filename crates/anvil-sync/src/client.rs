//! The requesting side of a sync session.

use std::collections::BTreeSet;
use std::sync::Arc;

use anvil_pack::PackReader;
use anvil_protocol::{check_hello, AnvilCodec, AnvilMessage, PushStatus, RefResult};
use anvil_refs::RefUpdate;
use anvil_repo::Repository;
use anvil_types::OperationId;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::negotiation::advertised_ops;
use crate::state::SessionState;
use crate::transfer::{build_pack, receive_pack, send_pack};

/// What a fetch brought in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchSummary {
    /// Operations imported, parents first.
    pub operations: Vec<OperationId>,
    /// Objects in the received pack.
    pub objects: usize,
    /// Local heads after the import.
    pub heads: BTreeSet<OperationId>,
}

impl FetchSummary {
    pub fn is_up_to_date(&self) -> bool {
        self.operations.is_empty()
    }
}

/// The server's answer to a push.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushSummary {
    pub status: PushStatus,
    pub new_op_head: Option<OperationId>,
    pub ref_results: Vec<RefResult>,
    /// Objects sent; zero when the server already had everything.
    pub objects_sent: usize,
}

/// One fetch or push against a server, over any byte stream.
pub struct ClientSession<S> {
    stream: S,
    config: SyncConfig,
    state: SessionState,
    capabilities: Vec<String>,
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Exchange `Hello` with a server that already knows which repository
    /// the stream is for.
    pub async fn connect(stream: S, config: SyncConfig) -> SyncResult<Self> {
        let mut session = Self {
            stream,
            config,
            state: SessionState::Init,
            capabilities: Vec::new(),
        };
        session.handshake().await?;
        Ok(session)
    }

    /// Name the repository (and present a token) before the handshake, as a
    /// multi-repository server expects.
    pub async fn connect_repository(
        mut stream: S,
        repository: &str,
        token: Option<String>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let connect = AnvilMessage::Connect {
            repository: repository.to_string(),
            token,
        };
        AnvilCodec::write_frame(&mut stream, &connect, config.max_frame_size).await?;
        Self::connect(stream, config).await
    }

    async fn handshake(&mut self) -> SyncResult<()> {
        self.state.advance(SessionState::Negotiating)?;
        let max = self.config.max_frame_size;
        AnvilCodec::write_frame(&mut self.stream, &AnvilMessage::hello(), max).await?;
        match self.next_frame().await? {
            AnvilMessage::Hello {
                version,
                capabilities,
            } => {
                self.capabilities = check_hello(version, &capabilities)?;
                debug!(capabilities = ?self.capabilities, "connected");
                Ok(())
            }
            other => Err(SyncError::unexpected("Hello", other)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Capabilities both sides support.
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Pull everything the server has that `repo` lacks and import it.
    pub async fn fetch(
        mut self,
        repo: Arc<Repository>,
        want_refs: Vec<String>,
    ) -> SyncResult<FetchSummary> {
        self.state.advance(SessionState::Fetching)?;
        let max = self.config.max_frame_size;
        let limit = self.config.advertise_limit;
        let snapshot = repo.clone();
        let have_ops = tokio::task::spawn_blocking(move || advertised_ops(&snapshot, limit)).await??;

        let request = AnvilMessage::FetchRequest {
            have_ops,
            want_refs,
            depth: None,
        };
        AnvilCodec::write_frame(&mut self.stream, &request, max).await?;

        let (ops, announced) = match self.next_frame().await? {
            AnvilMessage::FetchResponse {
                ops_to_send,
                object_count,
            } => (ops_to_send, object_count),
            other => return Err(SyncError::unexpected("FetchResponse", other)),
        };
        let pack = receive_pack(&mut self.stream, &self.config).await?;

        let max_object_size = self.config.max_object_size;
        let imported = ops.clone();
        let (objects, heads) = tokio::task::spawn_blocking(move || {
            let reader = PackReader::new().with_max_object_size(max_object_size);
            let index = repo.apply_pack(&pack, &reader)?;
            repo.import_operations(&imported)?;
            Ok::<_, SyncError>((index.len(), repo.heads()?))
        })
        .await??;
        if objects != announced as usize {
            return Err(SyncError::PackSummaryMismatch(format!(
                "fetch announced {announced} objects, pack held {objects}"
            )));
        }
        self.state.advance(SessionState::Closed)?;

        info!(operations = ops.len(), objects, heads = heads.len(), "fetch complete");
        Ok(FetchSummary {
            operations: ops,
            objects,
            heads,
        })
    }

    /// Offer our heads to the server, send whatever it lacks and let it
    /// install them, merging with concurrent pushes.
    pub async fn push(
        mut self,
        repo: Arc<Repository>,
        updates: Vec<RefUpdate>,
    ) -> SyncResult<PushSummary> {
        self.state.advance(SessionState::Pushing)?;
        let max = self.config.max_frame_size;
        let limit = self.config.advertise_limit;
        let snapshot = repo.clone();
        let (heads, have_ops) = tokio::task::spawn_blocking(move || {
            let heads = snapshot.heads()?;
            let have = advertised_ops(&snapshot, limit)?;
            Ok::<_, SyncError>((heads, have))
        })
        .await??;

        let request = AnvilMessage::PushRequest {
            heads: heads.into_iter().collect(),
            have_ops,
            updates,
        };
        AnvilCodec::write_frame(&mut self.stream, &request, max).await?;

        let mut objects_sent = 0;
        match self.next_frame().await? {
            AnvilMessage::PushNegotiate {
                common_op,
                need_objects,
            } => {
                debug!(
                    common = ?common_op.map(|c| c.short_hex()),
                    need_objects,
                    "server negotiated push"
                );
                if need_objects {
                    let known: BTreeSet<OperationId> = common_op.into_iter().collect();
                    let outgoing =
                        tokio::task::spawn_blocking(move || repo.outgoing(&known)).await??;
                    objects_sent = outgoing.entries.len();
                    let (pack, summary) = build_pack(outgoing.entries).await?;
                    send_pack(&mut self.stream, &pack, summary, &self.config).await?;
                }
            }
            // A rejection short-circuits negotiation.
            AnvilMessage::PushResult {
                status,
                new_op_head,
                ref_results,
            } => {
                self.state.advance(SessionState::Closed)?;
                return Ok(PushSummary {
                    status,
                    new_op_head,
                    ref_results,
                    objects_sent,
                });
            }
            other => return Err(SyncError::unexpected("PushNegotiate", other)),
        }

        match self.next_frame().await? {
            AnvilMessage::PushResult {
                status,
                new_op_head,
                ref_results,
            } => {
                self.state.advance(SessionState::Closed)?;
                info!(
                    status = status.as_str(),
                    op = ?new_op_head.map(|h| h.short_hex()),
                    objects_sent,
                    "push complete"
                );
                Ok(PushSummary {
                    status,
                    new_op_head,
                    ref_results,
                    objects_sent,
                })
            }
            other => Err(SyncError::unexpected("PushResult", other)),
        }
    }

    async fn next_frame(&mut self) -> SyncResult<AnvilMessage> {
        Ok(AnvilCodec::expect_frame(&mut self.stream, self.config.max_frame_size).await?)
    }
}
