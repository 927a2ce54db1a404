//! Wire types and header names shared by the seed API and the fetcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version this build reports to peers.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Header carrying the caller's client token when TLS identities are not in use.
pub const CLIENT_HEADER: &str = "x-seedsync-client";

/// Header stamped on every API response with the serving build's version.
pub const VERSION_HEADER: &str = "x-seedsync-version";

pub const MANIFEST_PATH: &str = "/manifest";
pub const FILE_PATH: &str = "/file";
pub const HEARTBEAT_PATH: &str = "/heartbeat";

/// `GET /heartbeat` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub version: String,
    pub alive: bool,
    /// Entry count of the seed's cached manifest, if one is cached.
    #[serde(default)]
    pub entries: Option<usize>,
    /// When the cached manifest was generated.
    #[serde(default)]
    pub manifest_generated_at: Option<DateTime<Utc>>,
}

/// `GET /file` query string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileQuery {
    pub path: String,
}
