use anvil_refs::RefUpdate;
use anvil_types::{ChangeId, CommitId, OperationId};
use async_trait::async_trait;

/// What a pre-receive hook is asked to approve.
#[derive(Clone, Debug)]
pub struct PushContext {
    pub repository: String,
    pub principal: String,
    pub updates: Vec<RefUpdate>,
}

/// Sent after a push is installed.
#[derive(Clone, Debug)]
pub struct PushNotification {
    pub repository: String,
    pub principal: String,
    pub new_op_head: OperationId,
    /// Commits that arrived with the push.
    pub commits: Vec<CommitId>,
    /// Change ids of those commits, deduplicated.
    pub change_ids: Vec<ChangeId>,
    pub conflicted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookDecision {
    Allow,
    Reject { reason: String },
}

/// Server-side extension points around a push.
///
/// `pre_receive` runs before any pack is accepted; a rejection turns into a
/// `rejected` push result. `post_receive` runs on its own task after the
/// heads are installed and cannot affect the push.
#[async_trait]
pub trait ReceiveHook: Send + Sync {
    async fn pre_receive(&self, ctx: &PushContext) -> HookDecision;
    async fn post_receive(&self, notification: &PushNotification);
}

pub struct NoOpHook;

#[async_trait]
impl ReceiveHook for NoOpHook {
    async fn pre_receive(&self, _ctx: &PushContext) -> HookDecision {
        HookDecision::Allow
    }

    async fn post_receive(&self, _notification: &PushNotification) {}
}
