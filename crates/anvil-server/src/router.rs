use std::sync::Arc;

use anvil_protocol::endpoints;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::registry::RepoRegistry;

/// Build the axum router for the operational endpoints.
pub fn build_router(registry: Arc<RepoRegistry>) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(handler::health_handler))
        .route(endpoints::INFO, get(handler::info_handler))
        .route(endpoints::REPO_HEADS, get(handler::repo_heads_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}
