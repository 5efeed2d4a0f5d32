use anvil_protocol::codes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("invalid repository name: {0}")]
    InvalidRepoName(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("authorization denied: {action} for {principal}")]
    AuthorizationDenied { principal: String, action: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] anvil_protocol::ProtocolError),

    #[error("sync error: {0}")]
    Sync(#[from] anvil_sync::SyncError),

    #[error("repository error: {0}")]
    Repo(#[from] anvil_repo::RepoError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable code for `Error` frames.
    pub fn code(&self) -> u32 {
        match self {
            ServerError::RepoNotFound(_) => codes::NOT_FOUND,
            ServerError::InvalidRepoName(_) => codes::REJECTED,
            ServerError::AuthFailed(_) | ServerError::AuthorizationDenied { .. } => {
                codes::UNAUTHORIZED
            }
            ServerError::Protocol(e) => e.code(),
            ServerError::Sync(e) => e.code(),
            ServerError::Repo(e) => e.code(),
            ServerError::Config(_) | ServerError::Io(_) | ServerError::Internal(_) => {
                codes::INTERNAL
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServerError::RepoNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRepoName(_) => StatusCode::BAD_REQUEST,
            ServerError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            ServerError::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        (self.status(), Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses() {
        let missing = ServerError::RepoNotFound("demo".into());
        assert_eq!(missing.code(), codes::NOT_FOUND);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let denied = ServerError::AuthorizationDenied {
            principal: "anonymous".into(),
            action: "write:demo".into(),
        };
        assert_eq!(denied.code(), codes::UNAUTHORIZED);
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }
}
