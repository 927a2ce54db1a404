//! HTTP API served by every seedsync process.

pub mod auth;
pub mod error;
pub mod health;
pub mod manifest_cache;
pub mod registry;
pub mod replication;
pub mod tls;

use axum::http::{HeaderName, HeaderValue};
use axum::{middleware, routing::get, Router};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::protocol;
use crate::sync::NodeStatus;

pub use auth::{AuthorizedClientSet, ClientId, PeerIdentity};
pub use manifest_cache::ManifestCache;
pub use registry::NodeRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub root: Arc<PathBuf>,
    pub version: Arc<str>,
    pub clients: Arc<AuthorizedClientSet>,
    pub manifests: ManifestCache,
    pub registry: NodeRegistry,
    /// Present when this process also runs the node update loop.
    pub node_status: Option<watch::Receiver<NodeStatus>>,
    pub tls_enabled: bool,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &Config, version: &str) -> Self {
        Self {
            root: Arc::new(config.root_dir.clone()),
            version: Arc::from(version),
            clients: Arc::new(AuthorizedClientSet::new(&config.authorized_clients)),
            manifests: ManifestCache::new(config.root_dir.clone(), version, config.api.manifest_cache_ttl),
            registry: NodeRegistry::new(),
            node_status: None,
            tls_enabled: config.tls.enabled,
            started_at: Instant::now(),
        }
    }

    pub fn with_node_status(mut self, status: watch::Receiver<NodeStatus>) -> Self {
        self.node_status = Some(status);
        self
    }
}

/// Create the API router. Everything except `/version` requires an
/// authorized caller; every response carries the version header.
pub fn create_router(state: AppState) -> Router {
    let version = HeaderValue::from_str(&state.version).unwrap_or_else(|_| HeaderValue::from_static("unknown"));

    let protected = Router::new()
        .route(protocol::MANIFEST_PATH, get(replication::manifest))
        .route(protocol::FILE_PATH, get(replication::file))
        .route(protocol::HEARTBEAT_PATH, get(replication::heartbeat))
        .route("/status", get(health::status))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_client));

    Router::new()
        .route("/version", get(health::version))
        .merge(protected)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(protocol::VERSION_HEADER),
            version,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
