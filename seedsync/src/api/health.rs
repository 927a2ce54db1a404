//! Version and status endpoints.

use axum::extract::State;
use axum::{response::IntoResponse, Json};
use serde_json::json;

use super::AppState;

/// GET /status - node loop snapshot and the nodes seen by this seed
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let node = state.node_status.as_ref().map(|rx| rx.borrow().clone());
    let manifest = state.manifests.peek();

    Json(json!({
        "version": state.version.as_ref(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "root_dir": state.root.display().to_string(),
        "manifest_entries": manifest.as_ref().map(|m| m.len()),
        "manifest_generated_at": manifest.as_ref().map(|m| m.generated_at),
        "node": node,
        "nodes": state.registry.snapshot().await,
    }))
}

/// GET /version - Version information endpoint
pub async fn version(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "version": state.version.as_ref(),
        "build": if cfg!(debug_assertions) { "debug" } else { "release" },
        "tls": state.tls_enabled,
    }))
}
