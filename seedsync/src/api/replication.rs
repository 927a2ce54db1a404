//! Endpoints nodes replicate from: manifest, file content and heartbeat.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use tokio_util::io::ReaderStream;

use super::auth::ClientId;
use super::error::ApiError;
use super::AppState;
use crate::fs::paths;
use crate::manifest::Manifest;
use crate::protocol::{FileQuery, Heartbeat};

/// GET /manifest
pub async fn manifest(State(state): State<AppState>) -> Result<Json<Manifest>, ApiError> {
    let manifest = state.manifests.get().await?;
    Ok(Json(manifest.as_ref().clone()))
}

/// GET /file?path=P - raw bytes of one manifest entry
pub async fn file(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let full_path = paths::resolve(&state.root, &query.path)?;

    // Only what the manifest lists is served: no temp files, no symlinks.
    let manifest = state.manifests.get().await?;
    let entry = manifest
        .get(&query.path)
        .ok_or_else(|| ApiError::NotFound("Not found".into()))?;

    let file = match tokio::fs::File::open(&full_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("Not found".into()));
        }
        Err(e) => return Err(ApiError::Internal(anyhow::anyhow!("Failed to open {}: {}", query.path, e))),
    };

    tracing::debug!(path = %query.path, size = entry.size, "Serving file");

    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], body))
}

/// GET /heartbeat - answered from cached state, never walks the tree
pub async fn heartbeat(State(state): State<AppState>, Extension(client): Extension<ClientId>) -> Json<Heartbeat> {
    state.registry.record(&client.0).await;

    let cached = state.manifests.peek();
    Json(Heartbeat {
        version: state.version.to_string(),
        alive: true,
        entries: cached.as_ref().map(|m| m.len()),
        manifest_generated_at: cached.as_ref().map(|m| m.generated_at),
    })
}
