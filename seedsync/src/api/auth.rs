//! Caller authorization.
//!
//! Over TLS a caller is identified only by its client certificate
//! fingerprint; the `x-seedsync-client` header is ignored there. Plain HTTP
//! listeners fall back to the header. The check runs before any handler
//! touches the filesystem.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashSet;

use super::error::ApiError;
use super::AppState;
use crate::protocol;
use crate::utils::errors::AuthorizationError;

/// Certificate identity attached to each TLS connection by the acceptor.
/// `None` when the peer presented no certificate.
#[derive(Debug, Clone, Default)]
pub struct PeerIdentity(pub Option<String>);

/// Resolved caller identity, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

pub const ANONYMOUS: &str = "anonymous";

/// Allow-list of client tokens and certificate fingerprints.
#[derive(Debug, Clone, Default)]
pub struct AuthorizedClientSet {
    allowed: HashSet<String>,
}

impl AuthorizedClientSet {
    pub fn new<I, S>(clients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = clients
            .into_iter()
            .map(|c| normalize(c.as_ref()))
            .filter(|c| !c.is_empty())
            .collect();
        Self { allowed }
    }

    /// No allow-list configured: every caller is accepted.
    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn authorize(&self, identity: Option<&str>) -> Result<(), AuthorizationError> {
        if self.is_open() {
            return Ok(());
        }
        match identity {
            Some(id) if self.allowed.contains(&normalize(id)) => Ok(()),
            _ => Err(AuthorizationError),
        }
    }
}

/// Fingerprints may be written with colons or in upper case.
fn normalize(id: &str) -> String {
    let id = id.trim();
    let stripped: String = id.chars().filter(|c| *c != ':').collect();
    if stripped.len() == 64 && stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        stripped.to_ascii_lowercase()
    } else {
        id.to_string()
    }
}

fn identify(request: &Request, tls: bool) -> Option<String> {
    if tls {
        return request
            .extensions()
            .get::<PeerIdentity>()
            .and_then(|peer| peer.0.clone());
    }
    request
        .headers()
        .get(protocol::CLIENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Middleware rejecting callers outside the allow-list with a bare 401.
pub async fn require_client(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let identity = identify(&request, state.tls_enabled);

    if let Err(e) = state.clients.authorize(identity.as_deref()) {
        tracing::warn!(
            client = identity.as_deref().unwrap_or(ANONYMOUS),
            path = %request.uri().path(),
            "Rejected unauthorized request"
        );
        return ApiError::from(e).into_response();
    }

    let id = identity.unwrap_or_else(|| ANONYMOUS.to_string());
    request.extensions_mut().insert(ClientId(id));
    next.run(request).await
}
