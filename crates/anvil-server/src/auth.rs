use async_trait::async_trait;

use crate::error::{ServerError, ServerResult};

/// Who is on the other end of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub is_admin: bool,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".into(),
            is_admin: false,
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_admin: false,
        }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_admin: true,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.name == "anonymous" && !self.is_admin
    }
}

/// What a `Connect` frame presented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(t) if !t.is_empty() => Credentials::Bearer(t),
            _ => Credentials::Anonymous,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Read { repo: String },
    Write { repo: String },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { repo } => write!(f, "read:{repo}"),
            Self::Write { repo } => write!(f, "write:{repo}"),
        }
    }
}

/// Turns credentials into an identity and decides what it may do.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool>;
}

/// Accepts everyone. Bearer tokens become a user named after the token prefix.
pub struct AllowAllAuth;

#[async_trait]
impl AuthProvider for AllowAllAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => {
                let prefix: String = token.chars().take(8).collect();
                Ok(Identity::user(format!("bearer:{prefix}")))
            }
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, _identity: &Identity, _action: &Action) -> ServerResult<bool> {
        Ok(true)
    }
}

/// Authorize `action` or fail with [`ServerError::AuthorizationDenied`].
pub async fn require(
    auth: &dyn AuthProvider,
    identity: &Identity,
    action: Action,
) -> ServerResult<()> {
    if auth.authorize(identity, &action).await? {
        Ok(())
    } else {
        Err(ServerError::AuthorizationDenied {
            principal: identity.name.clone(),
            action: action.to_string(),
        })
    }
}
