//! Configuration for seedsync.
//!
//! Loaded once from a TOML file (with CLI overrides applied by `main`),
//! validated, then shared read-only as `Arc<Config>`. Reloading means
//! building a new value, never mutating a shared one.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::{duration, Result, SeedSyncError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory served to peers and, on nodes, kept in sync with the seeds
    #[serde(default)]
    pub root_dir: PathBuf,

    /// Pull from seeds in addition to serving
    #[serde(default)]
    pub run_as_node: bool,

    /// Identity this node presents to seeds as its client token
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Single-seed form kept for older configuration files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,

    /// Client identities allowed to call the API (tokens or TLS certificate
    /// fingerprints). Empty means the API is open.
    #[serde(default)]
    pub authorized_clients: Vec<String>,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long a built manifest is reused before the tree is walked again
    #[serde(default = "default_manifest_cache_ttl", with = "duration")]
    pub manifest_cache_ttl: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Seeds in failover preference order
    #[serde(default)]
    pub seed_servers: Vec<String>,

    #[serde(default = "default_heartbeat_interval", with = "duration")]
    pub heartbeat_interval: Duration,

    /// Full sync interval; must not be shorter than the heartbeat interval
    #[serde(default = "default_update_interval", with = "duration")]
    pub update_interval: Duration,

    /// Replicate even when the seed runs a different version
    #[serde(default)]
    pub ignore_version_mismatch: bool,

    /// Files downloaded in parallel during one sync
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Upper bound for every outbound request (and for each idle gap while
    /// streaming a file)
    #[serde(default = "default_request_timeout", with = "duration")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// PEM certificate chain, also presented as the client certificate
    #[serde(default)]
    pub cert: Option<PathBuf>,

    /// PEM private key for `cert`
    #[serde(default)]
    pub key: Option<PathBuf>,

    /// CA used to verify peers. When set, API callers must present a
    /// certificate signed by it and are identified by its fingerprint.
    #[serde(default)]
    pub client_ca: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Upper bound for every configured interval and timeout.
pub const MAX_INTERVAL: Duration = Duration::from_secs(30 * 24 * 3600);

// Default values
fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "seedsync-node".to_string())
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_manifest_cache_ttl() -> Duration {
    Duration::from_secs(2)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_update_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            manifest_cache_ttl: default_manifest_cache_ttl(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            seed_servers: Vec::new(),
            heartbeat_interval: default_heartbeat_interval(),
            update_interval: default_update_interval(),
            ignore_version_mismatch: false,
            max_concurrent_fetches: default_max_concurrent_fetches(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::new(),
            run_as_node: false,
            node_id: default_node_id(),
            seed: None,
            authorized_clients: Vec::new(),
            api: ApiConfig::default(),
            node: NodeConfig::default(),
            tls: TlsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SeedSyncError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SeedSyncError::Config(e.to_string()))
    }

    /// Fold the legacy single `seed` into `node.seed_servers`.
    pub fn normalize(&mut self) {
        if let Some(seed) = self.seed.take() {
            if !seed.is_empty() && !self.node.seed_servers.contains(&seed) {
                self.node.seed_servers.insert(0, seed);
            }
        }
    }

    /// Check the invariants the core relies on.
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(SeedSyncError::Config("root directory must be specified".into()));
        }

        for (name, value) in [
            ("manifest_cache_ttl", self.api.manifest_cache_ttl),
            ("heartbeat_interval", self.node.heartbeat_interval),
            ("update_interval", self.node.update_interval),
            ("request_timeout", self.node.request_timeout),
        ] {
            if value > MAX_INTERVAL {
                return Err(SeedSyncError::Config(format!(
                    "{name} must not exceed {}",
                    duration::format(MAX_INTERVAL)
                )));
            }
        }

        if self.run_as_node {
            if self.node.seed_servers.is_empty() {
                return Err(SeedSyncError::Config(
                    "at least one seed server is required when running as a node".into(),
                ));
            }
            if self.node.seed_servers.iter().any(|s| s.trim().is_empty()) {
                return Err(SeedSyncError::Config("seed server addresses must not be empty".into()));
            }
            if self.node.heartbeat_interval.is_zero() {
                return Err(SeedSyncError::Config("heartbeat interval must be positive".into()));
            }
            if self.node.update_interval < self.node.heartbeat_interval {
                return Err(SeedSyncError::Config(format!(
                    "update interval ({}) must not be shorter than heartbeat interval ({})",
                    duration::format(self.node.update_interval),
                    duration::format(self.node.heartbeat_interval),
                )));
            }
            if self.node.max_concurrent_fetches == 0 {
                return Err(SeedSyncError::Config("max_concurrent_fetches must be at least 1".into()));
            }
            if self.node.request_timeout.is_zero() {
                return Err(SeedSyncError::Config("request timeout must be positive".into()));
            }
        }

        if self.tls.enabled && (self.tls.cert.is_none() || self.tls.key.is_none()) {
            return Err(SeedSyncError::Config(
                "TLS is enabled but certificate or key path is missing".into(),
            ));
        }

        // Under TLS, callers are identified by their certificate only.
        if self.tls.enabled && !self.authorized_clients.is_empty() && self.tls.client_ca.is_none() {
            return Err(SeedSyncError::Config(
                "authorized_clients with TLS requires tls.client_ca to verify client certificates".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
root_dir = "/srv/assets"
run_as_node = true
node_id = "web-01"
authorized_clients = ["web-02", "web-03"]

[api]
port = 9000

[node]
seed_servers = ["https://seed-a:8081", "https://seed-b:8081"]
heartbeat_interval = "10s"
update_interval = "2m"

[tls]
enabled = true
cert = "/etc/seedsync/cert.pem"
key = "/etc/seedsync/key.pem"
client_ca = "/etc/seedsync/ca.pem"
"#;

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.root_dir, PathBuf::from("/srv/assets"));
        assert_eq!(config.node_id, "web-01");
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.bind_address, "0.0.0.0");
        assert_eq!(config.node.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.node.update_interval, Duration::from_secs(120));
        assert_eq!(config.node.max_concurrent_fetches, 4);
        assert!(!config.node.ignore_version_mismatch);
        assert!(config.tls.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_seed_config() {
        let config = Config::from_toml(r#"root_dir = "/srv""#).unwrap();
        assert!(!config.run_as_node);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_requires_root() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(SeedSyncError::Config(_))));
    }

    #[test]
    fn test_node_requires_seed() {
        let config = Config::from_toml("root_dir = \"/srv\"\nrun_as_node = true").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_legacy_seed_is_folded_in() {
        let mut config =
            Config::from_toml("root_dir = \"/srv\"\nrun_as_node = true\nseed = \"http://old:8081\"")
                .unwrap();
        config.normalize();
        assert_eq!(config.node.seed_servers, vec!["http://old:8081"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sync_interval_must_cover_heartbeat() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.node.update_interval = Duration::from_secs(5);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("update interval"));
    }

    #[test]
    fn test_tls_requires_key_material() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.tls.key = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tls_allow_list_requires_client_ca() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.tls.client_ca = None;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("client_ca"));

        config.authorized_clients.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_intervals_are_rejected() {
        let config = Config::from_toml(
            "root_dir = \"/srv\"\nrun_as_node = true\n[node]\nseed_servers = [\"a:8081\"]\nupdate_interval = \"18446744073709551615\"",
        )
        .unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("update_interval"));

        let result = Config::from_toml("root_dir = \"/srv\"\n[node]\nupdate_interval = \"999999999999999999h\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        let result = Config::from_toml("root_dir = \"/srv\"\n[node]\nheartbeat_interval = \"soon\"");
        assert!(result.is_err());
    }
}
