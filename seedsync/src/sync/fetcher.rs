//! HTTP(S) client for talking to seeds.
//!
//! The fetcher performs exactly one attempt per call; retry and failover
//! decisions belong to the update loop.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::HeaderValue;
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::apply::{ByteStream, FileSource};
use crate::config::Config;
use crate::manifest::Manifest;
use crate::protocol::{self, Heartbeat};
use crate::utils::errors::{
    FetchCause, FetchError, FetchPhase, RemoteError, VersionMismatchError,
};
use crate::utils::{Result, SeedSyncError};

/// Operations the update loop needs from a seed.
#[async_trait]
pub trait SeedClient: Send + Sync + 'static {
    /// Liveness and version check. Fails with a version mismatch when the
    /// seed is incompatible.
    async fn heartbeat(&self, seed: &str) -> std::result::Result<Heartbeat, RemoteError>;

    /// Current manifest of the seed, checked for version compatibility
    /// before it is requested.
    async fn fetch_manifest(&self, seed: &str) -> std::result::Result<Manifest, RemoteError>;

    /// Body of one file.
    async fn fetch_file(&self, seed: &str, path: &str) -> std::result::Result<ByteStream, RemoteError>;
}

/// Production [`SeedClient`] backed by reqwest.
pub struct Fetcher {
    client: Client,
    client_id: String,
    local_version: String,
    ignore_version_mismatch: bool,
    default_scheme: &'static str,
    request_timeout: Duration,
}

impl Fetcher {
    pub fn new(config: &Config, local_version: impl Into<String>) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.node.request_timeout)
            .user_agent(format!("seedsync/{}", protocol::VERSION))
            .use_rustls_tls();

        if config.tls.enabled {
            if let (Some(cert), Some(key)) = (&config.tls.cert, &config.tls.key) {
                let mut pem = std::fs::read(cert)?;
                pem.push(b'\n');
                pem.extend(std::fs::read(key)?);
                let identity = reqwest::Identity::from_pem(&pem)
                    .map_err(|e| SeedSyncError::Tls(format!("invalid client identity: {e}")))?;
                builder = builder.identity(identity);
            }
            if let Some(ca) = &config.tls.client_ca {
                let pem = std::fs::read(ca)?;
                let certificate = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| SeedSyncError::Tls(format!("invalid CA certificate: {e}")))?;
                builder = builder.add_root_certificate(certificate);
            }
        }

        let client = builder
            .build()
            .map_err(|e| SeedSyncError::Tls(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            client_id: config.node_id.clone(),
            local_version: local_version.into(),
            ignore_version_mismatch: config.node.ignore_version_mismatch,
            default_scheme: if config.tls.enabled { "https" } else { "http" },
            request_timeout: config.node.request_timeout,
        })
    }

    pub fn local_version(&self) -> &str {
        &self.local_version
    }

    /// Full URL for an API path on `seed`. Bare `host:port` seeds get the
    /// scheme implied by the TLS setting.
    fn url(&self, seed: &str, path: &str) -> String {
        let base = seed.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}{path}")
        } else {
            format!("{}://{base}{path}", self.default_scheme)
        }
    }

    /// Compare a seed's reported version with ours.
    pub fn check_version(&self, seed: &str, remote: &str) -> std::result::Result<(), VersionMismatchError> {
        if self.ignore_version_mismatch || remote == self.local_version {
            return Ok(());
        }
        Err(VersionMismatchError {
            seed: seed.to_string(),
            local: self.local_version.clone(),
            remote: remote.to_string(),
        })
    }

    async fn get(
        &self,
        phase: FetchPhase,
        seed: &str,
        path: &str,
        query: Option<&[(&str, &str)]>,
        timeout: Option<Duration>,
    ) -> std::result::Result<Response, FetchError> {
        let url = self.url(seed, path);
        let mut request = self
            .client
            .get(&url)
            .header(protocol::CLIENT_HEADER, &self.client_id);
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        debug!(%url, %phase, "Requesting from seed");

        let response = match tokio::time::timeout(self.request_timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(FetchError::from_reqwest(phase, seed, &e)),
            Err(_) => return Err(FetchError::new(phase, seed, FetchCause::Timeout)),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(phase, seed, FetchCause::Status(status.as_u16())));
        }
        Ok(response)
    }

    fn version_header(response: &Response) -> Option<&str> {
        response
            .headers()
            .get(protocol::VERSION_HEADER)
            .and_then(|v: &HeaderValue| v.to_str().ok())
    }
}

#[async_trait]
impl SeedClient for Fetcher {
    async fn heartbeat(&self, seed: &str) -> std::result::Result<Heartbeat, RemoteError> {
        let response = self
            .get(FetchPhase::Heartbeat, seed, protocol::HEARTBEAT_PATH, None, Some(self.request_timeout))
            .await?;
        let heartbeat: Heartbeat = response
            .json()
            .await
            .map_err(|e| FetchError::from_reqwest(FetchPhase::Heartbeat, seed, &e))?;

        self.check_version(seed, &heartbeat.version)?;
        if !heartbeat.alive {
            return Err(FetchError::new(
                FetchPhase::Heartbeat,
                seed,
                FetchCause::Decode("seed reports it is not alive".to_string()),
            )
            .into());
        }
        Ok(heartbeat)
    }

    async fn fetch_manifest(&self, seed: &str) -> std::result::Result<Manifest, RemoteError> {
        // Version gate first: never pull a manifest from an incompatible seed.
        self.heartbeat(seed).await?;

        let response = self
            .get(FetchPhase::Manifest, seed, protocol::MANIFEST_PATH, None, Some(self.request_timeout))
            .await?;
        let manifest: Manifest = response
            .json()
            .await
            .map_err(|e| FetchError::from_reqwest(FetchPhase::Manifest, seed, &e))?;

        self.check_version(seed, &manifest.server_version)?;
        manifest
            .validate()
            .map_err(|reason| FetchError::new(FetchPhase::Manifest, seed, FetchCause::Decode(reason)))?;

        debug!(%seed, files = manifest.len(), "Fetched manifest");
        Ok(manifest)
    }

    async fn fetch_file(&self, seed: &str, path: &str) -> std::result::Result<ByteStream, RemoteError> {
        // No total timeout: large files may legitimately take long. Each gap
        // between chunks is bounded instead.
        let response = self
            .get(FetchPhase::File, seed, protocol::FILE_PATH, Some(&[("path", path)]), None)
            .await?;

        if let Some(remote) = Self::version_header(&response) {
            self.check_version(seed, remote)?;
        }

        Ok(idle_timeout_stream(response, seed.to_string(), self.request_timeout))
    }
}

/// Wrap a response body so that a stall longer than `idle` ends the stream
/// with a timeout error.
fn idle_timeout_stream(response: Response, seed: String, idle: Duration) -> ByteStream {
    let body = response.bytes_stream().boxed();
    futures_util::stream::unfold(Some(body), move |state| {
        let seed = seed.clone();
        async move {
            let mut body = state?;
            match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
                Ok(Some(Err(e))) => Some((Err(FetchError::from_reqwest(FetchPhase::File, &seed, &e)), None)),
                Ok(None) => None,
                Err(_) => Some((Err(FetchError::new(FetchPhase::File, seed, FetchCause::Timeout)), None)),
            }
        }
    })
    .boxed()
}

/// [`FileSource`] bound to one seed, handed to the applier for a sync.
pub struct SeedFileSource<C: SeedClient> {
    client: Arc<C>,
    seed: String,
}

impl<C: SeedClient> SeedFileSource<C> {
    pub fn new(client: Arc<C>, seed: impl Into<String>) -> Self {
        Self {
            client,
            seed: seed.into(),
        }
    }
}

#[async_trait]
impl<C: SeedClient> FileSource for SeedFileSource<C> {
    async fn open(&self, path: &str) -> std::result::Result<ByteStream, RemoteError> {
        self.client.fetch_file(&self.seed, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> Config {
        Config {
            node_id: "node-under-test".to_string(),
            ..Config::default()
        }
    }

    /// Start a fake seed reporting `version`; returns its address and a
    /// counter of manifest requests.
    async fn fake_seed(version: &'static str) -> (String, Arc<AtomicUsize>) {
        let manifest_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&manifest_hits);

        let app = Router::new()
            .route(
                "/heartbeat",
                get(move || async move {
                    Json(Heartbeat {
                        version: version.to_string(),
                        alive: true,
                        entries: None,
                        manifest_generated_at: None,
                    })
                }),
            )
            .route(
                "/manifest",
                get(move || {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Json(Manifest::new(version, vec![]))
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr.to_string(), manifest_hits)
    }

    #[tokio::test]
    async fn test_version_mismatch_blocks_manifest_fetch() {
        let (seed, manifest_hits) = fake_seed("2.0").await;
        let fetcher = Fetcher::new(&config(), "1.0").unwrap();

        let err = fetcher.fetch_manifest(&seed).await.unwrap_err();

        assert!(matches!(err, RemoteError::VersionMismatch(ref e) if e.remote == "2.0" && e.local == "1.0"));
        assert_eq!(manifest_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ignore_version_mismatch() {
        let (seed, manifest_hits) = fake_seed("2.0").await;
        let mut config = config();
        config.node.ignore_version_mismatch = true;
        let fetcher = Fetcher::new(&config, "1.0").unwrap();

        let manifest = fetcher.fetch_manifest(&seed).await.unwrap();
        assert!(manifest.is_empty());
        assert_eq!(manifest_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_seed_is_a_fetch_error() {
        let fetcher = Fetcher::new(&config(), "1.0").unwrap();
        // Port 9 (discard) on localhost is assumed closed.
        let err = fetcher.heartbeat("127.0.0.1:9").await.unwrap_err();
        match err {
            RemoteError::Fetch(e) => {
                assert_eq!(e.phase, FetchPhase::Heartbeat);
                assert_eq!(e.seed, "127.0.0.1:9");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let (seed, _) = fake_seed("1.0").await;
        let fetcher = Fetcher::new(&config(), "1.0").unwrap();

        let err = match fetcher.fetch_file(&seed, "nope.txt").await {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, RemoteError::Fetch(FetchError { cause: FetchCause::Status(404), .. })));
    }

    #[test]
    fn test_url_building() {
        let fetcher = Fetcher::new(&config(), "1.0").unwrap();
        assert_eq!(fetcher.url("seed:8081", "/manifest"), "http://seed:8081/manifest");
        assert_eq!(fetcher.url("https://seed:8081/", "/heartbeat"), "https://seed:8081/heartbeat");
    }

    #[test]
    fn test_check_version() {
        let fetcher = Fetcher::new(&config(), "1.0").unwrap();
        assert!(fetcher.check_version("s", "1.0").is_ok());
        assert!(fetcher.check_version("s", "2.0").is_err());
    }
}
