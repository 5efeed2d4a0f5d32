//! Receive hooks installed by the server.

use std::sync::Arc;

use anvil_sync::{HookDecision, PushContext, PushNotification, ReceiveHook};
use async_trait::async_trait;
use tracing::info;

use crate::auth::{require, Action, AuthProvider, Identity};

/// Logs every installed push. The server's default hook.
pub struct LoggingHook;

#[async_trait]
impl ReceiveHook for LoggingHook {
    async fn pre_receive(&self, _ctx: &PushContext) -> HookDecision {
        HookDecision::Allow
    }

    async fn post_receive(&self, n: &PushNotification) {
        info!(
            repository = %n.repository,
            principal = %n.principal,
            op = %n.new_op_head.short_hex(),
            commits = n.commits.len(),
            changes = n.change_ids.len(),
            conflicted = n.conflicted,
            "push received"
        );
    }
}

/// Checks write permission for the connection's identity before handing the
/// push to the configured hook.
pub struct AuthorizingHook {
    auth: Arc<dyn AuthProvider>,
    identity: Identity,
    inner: Arc<dyn ReceiveHook>,
}

impl AuthorizingHook {
    pub fn new(auth: Arc<dyn AuthProvider>, identity: Identity, inner: Arc<dyn ReceiveHook>) -> Self {
        Self {
            auth,
            identity,
            inner,
        }
    }
}

#[async_trait]
impl ReceiveHook for AuthorizingHook {
    async fn pre_receive(&self, ctx: &PushContext) -> HookDecision {
        let action = Action::Write {
            repo: ctx.repository.clone(),
        };
        if let Err(e) = require(self.auth.as_ref(), &self.identity, action).await {
            return HookDecision::Reject {
                reason: e.to_string(),
            };
        }
        self.inner.pre_receive(ctx).await
    }

    async fn post_receive(&self, notification: &PushNotification) {
        self.inner.post_receive(notification).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AllowAllAuth, Credentials};
    use crate::error::ServerResult;

    struct ReadOnlyAuth;

    #[async_trait]
    impl AuthProvider for ReadOnlyAuth {
        async fn authenticate(&self, _credentials: &Credentials) -> ServerResult<Identity> {
            Ok(Identity::anonymous())
        }

        async fn authorize(&self, _identity: &Identity, action: &Action) -> ServerResult<bool> {
            Ok(matches!(action, Action::Read { .. }))
        }
    }

    fn ctx() -> PushContext {
        PushContext {
            repository: "demo".into(),
            principal: "anonymous".into(),
            updates: vec![],
        }
    }

    #[tokio::test]
    async fn denied_writers_are_rejected() {
        let hook = AuthorizingHook::new(
            Arc::new(ReadOnlyAuth),
            Identity::anonymous(),
            Arc::new(LoggingHook),
        );
        match hook.pre_receive(&ctx()).await {
            HookDecision::Reject { reason } => assert!(reason.contains("write:demo")),
            HookDecision::Allow => panic!("write should be denied"),
        }
    }

    #[tokio::test]
    async fn permitted_writers_reach_the_inner_hook() {
        let hook = AuthorizingHook::new(
            Arc::new(AllowAllAuth),
            Identity::user("ada"),
            Arc::new(LoggingHook),
        );
        assert_eq!(hook.pre_receive(&ctx()).await, HookDecision::Allow);
    }
}
