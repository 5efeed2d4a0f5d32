use std::sync::Arc;

use anvil_protocol::HealthResponse;
use anvil_types::OperationId;
use axum::extract::{Path, State};
use axum::response::Json;
use serde::Serialize;
use serde_json::json;

use crate::error::{ServerError, ServerResult};
use crate::registry::RepoRegistry;

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Info handler.
pub async fn info_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": "anvil-server",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol_version": anvil_protocol::PROTOCOL_VERSION,
        "capabilities": anvil_protocol::local_capabilities(),
    }))
}

#[derive(Clone, Debug, Serialize)]
pub struct RepoHeadsResponse {
    pub repository: String,
    pub heads: Vec<OperationId>,
}

/// Current operation heads of one repository.
pub async fn repo_heads_handler(
    State(registry): State<Arc<RepoRegistry>>,
    Path(name): Path<String>,
) -> ServerResult<Json<RepoHeadsResponse>> {
    let heads = tokio::task::spawn_blocking(move || {
        let repo = registry.open(&name)?;
        let heads = repo.heads()?.into_iter().collect();
        Ok::<_, ServerError>(RepoHeadsResponse {
            repository: name,
            heads,
        })
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))??;
    Ok(Json(heads))
}
