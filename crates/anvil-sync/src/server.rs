//! The serving side of a sync session.

use std::collections::BTreeSet;
use std::sync::Arc;

use anvil_protocol::{check_hello, AnvilCodec, AnvilMessage, PushStatus, RefResult};
use anvil_refs::RefUpdate;
use anvil_repo::{RepoError, Repository};
use anvil_store::{Commit, ObjectKind, ObjectStoreExt};
use anvil_types::{ChangeId, CommitId, OperationId};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::hooks::{HookDecision, NoOpHook, PushContext, PushNotification, ReceiveHook};
use crate::negotiation::{recognized, ref_results, rejected};
use crate::state::SessionState;
use crate::transfer::{build_pack, receive_pack, send_pack};

/// What one served session did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionSummary {
    Fetch {
        operations: usize,
        objects: usize,
    },
    Push {
        status: PushStatus,
        new_op_head: Option<OperationId>,
    },
    /// The peer hung up after the handshake.
    Idle,
}

/// Serves one fetch or push over a byte stream against a shared repository.
pub struct ServerSession {
    repo: Arc<Repository>,
    repository: String,
    principal: String,
    config: SyncConfig,
    hook: Arc<dyn ReceiveHook>,
    state: SessionState,
}

impl ServerSession {
    pub fn new(repo: Arc<Repository>, config: SyncConfig) -> Self {
        Self {
            repo,
            repository: String::new(),
            principal: "anonymous".into(),
            config,
            hook: Arc::new(NoOpHook),
            state: SessionState::Init,
        }
    }

    /// Name used in logs and hook payloads.
    pub fn with_repository_name(mut self, name: impl Into<String>) -> Self {
        self.repository = name.into();
        self
    }

    /// Authenticated principal, recorded on pushed operations.
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = principal.into();
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn ReceiveHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion. Errors are reported to the peer as an
    /// `Error` frame when the stream is still usable.
    pub async fn run<S>(mut self, stream: &mut S) -> SyncResult<SessionSummary>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.serve(stream).await;
        let _ = self.state.advance(SessionState::Closed);
        match result {
            Ok(summary) => Ok(summary),
            Err(err) => {
                if err.reportable() {
                    let frame = AnvilMessage::Error {
                        code: err.code(),
                        message: err.to_string(),
                    };
                    if let Err(send_err) =
                        AnvilCodec::write_frame(stream, &frame, self.config.max_frame_size).await
                    {
                        debug!(error = %send_err, "could not report error to peer");
                    }
                }
                error!(
                    repository = %self.repository,
                    principal = %self.principal,
                    code = err.code(),
                    error = %err,
                    "sync session failed"
                );
                Err(err)
            }
        }
    }

    async fn serve<S>(&mut self, stream: &mut S) -> SyncResult<SessionSummary>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.state.advance(SessionState::Negotiating)?;
        let max = self.config.max_frame_size;
        match AnvilCodec::expect_frame(stream, max).await? {
            AnvilMessage::Hello {
                version,
                capabilities,
            } => {
                let negotiated = check_hello(version, &capabilities)?;
                debug!(?negotiated, "handshake accepted");
            }
            other => return Err(SyncError::unexpected("Hello", other)),
        }
        AnvilCodec::write_frame(stream, &AnvilMessage::hello(), max).await?;

        match AnvilCodec::read_frame(stream, max).await? {
            None => Ok(SessionSummary::Idle),
            Some(AnvilMessage::FetchRequest {
                have_ops,
                want_refs,
                depth,
            }) => {
                self.state.advance(SessionState::Fetching)?;
                debug!(have = have_ops.len(), ?want_refs, ?depth, "fetch requested");
                self.serve_fetch(stream, have_ops).await
            }
            Some(AnvilMessage::PushRequest {
                heads,
                have_ops,
                updates,
            }) => {
                self.state.advance(SessionState::Pushing)?;
                self.serve_push(stream, heads, have_ops, updates).await
            }
            Some(other) => Err(SyncError::unexpected("FetchRequest or PushRequest", other)),
        }
    }

    async fn serve_fetch<S>(
        &mut self,
        stream: &mut S,
        have_ops: Vec<OperationId>,
    ) -> SyncResult<SessionSummary>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let repo = self.repo.clone();
        let outgoing = tokio::task::spawn_blocking(move || {
            let known = recognized(&repo, &have_ops)?;
            repo.outgoing(&known)
        })
        .await??;

        let operations = outgoing.operations.len();
        let objects = outgoing.entries.len();
        let response = AnvilMessage::FetchResponse {
            ops_to_send: outgoing.operations,
            object_count: u32::try_from(objects).map_err(|_| SyncError::PackTooLarge {
                max: self.config.max_pack_size,
            })?,
        };
        AnvilCodec::write_frame(stream, &response, self.config.max_frame_size).await?;

        let (pack, summary) = build_pack(outgoing.entries).await?;
        send_pack(stream, &pack, summary, &self.config).await?;
        info!(
            repository = %self.repository,
            principal = %self.principal,
            operations,
            objects,
            bytes = pack.len(),
            "served fetch"
        );
        Ok(SessionSummary::Fetch {
            operations,
            objects,
        })
    }

    async fn serve_push<S>(
        &mut self,
        stream: &mut S,
        heads: Vec<OperationId>,
        have_ops: Vec<OperationId>,
        updates: Vec<RefUpdate>,
    ) -> SyncResult<SessionSummary>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let max = self.config.max_frame_size;

        let invalid = updates.iter().find_map(|u| u.validate().err());
        let decision = match invalid {
            Some(err) => HookDecision::Reject {
                reason: err.to_string(),
            },
            None if heads.is_empty() => HookDecision::Reject {
                reason: "push names no operation heads".into(),
            },
            None => {
                let ctx = PushContext {
                    repository: self.repository.clone(),
                    principal: self.principal.clone(),
                    updates: updates.clone(),
                };
                self.hook.pre_receive(&ctx).await
            }
        };
        if let HookDecision::Reject { reason } = decision {
            warn!(
                repository = %self.repository,
                principal = %self.principal,
                %reason,
                "push rejected"
            );
            let result = AnvilMessage::PushResult {
                status: PushStatus::Rejected,
                new_op_head: None,
                ref_results: rejected(&updates, &reason),
            };
            AnvilCodec::write_frame(stream, &result, max).await?;
            return Ok(SessionSummary::Push {
                status: PushStatus::Rejected,
                new_op_head: None,
            });
        }

        let heads: BTreeSet<OperationId> = heads.into_iter().collect();
        let repo = self.repo.clone();
        let wanted_heads = heads.clone();
        let (common_op, need_objects) = tokio::task::spawn_blocking(move || {
            let known = recognized(&repo, &have_ops)?;
            let server_heads = repo.heads()?;
            let common = repo
                .graph()
                .find_common_ancestor(&server_heads, &known)
                .map_err(RepoError::from)?;
            let have_all = recognized(&repo, &wanted_heads.iter().copied().collect::<Vec<_>>())?
                .len()
                == wanted_heads.len();
            Ok::<_, SyncError>((common, !have_all))
        })
        .await??;
        debug!(
            common = ?common_op.map(|c| c.short_hex()),
            need_objects,
            "push negotiated"
        );
        let negotiate = AnvilMessage::PushNegotiate {
            common_op,
            need_objects,
        };
        AnvilCodec::write_frame(stream, &negotiate, max).await?;

        let pack = if need_objects {
            Some(receive_pack(stream, &self.config).await?)
        } else {
            None
        };

        let repo = self.repo.clone();
        let principal = self.principal.clone();
        let max_object_size = self.config.max_object_size;
        let install_heads = heads.clone();
        let (outcome, commits) = tokio::task::spawn_blocking(move || {
            let mut commits = Vec::new();
            if let Some(pack) = pack {
                let reader = anvil_pack::PackReader::new().with_max_object_size(max_object_size);
                let index = repo.apply_pack(&pack, &reader)?;
                let ops: Vec<OperationId> = index
                    .iter()
                    .filter(|(_, kind)| *kind == ObjectKind::Operation)
                    .map(|(id, _)| OperationId::from(*id))
                    .collect();
                commits = index
                    .iter()
                    .filter(|(_, kind)| *kind == ObjectKind::Commit)
                    .map(|(id, _)| CommitId::from(*id))
                    .collect();
                repo.insert_operations(&ops)?;
            }
            let outcome = repo.install_incoming(&install_heads, &principal)?;
            Ok::<_, SyncError>((outcome, commits))
        })
        .await??;

        let status = if outcome.has_conflicts() {
            PushStatus::Conflict
        } else {
            PushStatus::Ok
        };
        let results: Vec<RefResult> = ref_results(&updates, &outcome.view);
        let reply = AnvilMessage::PushResult {
            status,
            new_op_head: Some(outcome.new_head),
            ref_results: results,
        };
        AnvilCodec::write_frame(stream, &reply, max).await?;
        info!(
            repository = %self.repository,
            principal = %self.principal,
            op = %outcome.new_head.short_hex(),
            status = status.as_str(),
            fast_forward = outcome.fast_forward,
            commits = commits.len(),
            "push installed"
        );

        self.notify(outcome.new_head, commits, status == PushStatus::Conflict);
        Ok(SessionSummary::Push {
            status,
            new_op_head: Some(outcome.new_head),
        })
    }

    /// Fire the post-receive hook on its own task.
    fn notify(&self, new_op_head: OperationId, commits: Vec<CommitId>, conflicted: bool) {
        let repo = self.repo.clone();
        let hook = self.hook.clone();
        let repository = self.repository.clone();
        let principal = self.principal.clone();
        tokio::spawn(async move {
            let lookup_commits = commits.clone();
            let change_ids = tokio::task::spawn_blocking(move || {
                let mut ids: Vec<ChangeId> = lookup_commits
                    .iter()
                    .filter_map(|id| repo.store().read_object::<Commit>(*id).ok())
                    .map(|c| c.change_id)
                    .collect();
                ids.sort();
                ids.dedup();
                ids
            })
            .await
            .unwrap_or_default();
            let notification = PushNotification {
                repository,
                principal,
                new_op_head,
                commits,
                change_ids,
                conflicted,
            };
            hook.post_receive(&notification).await;
        });
    }
}
