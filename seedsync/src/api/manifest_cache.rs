//! Short-lived cache of the served root's manifest.
//!
//! Rebuilds are serialized: concurrent requests after expiry wait for one
//! walk instead of each starting their own.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::manifest::{Manifest, ManifestBuilder};
use crate::utils::{Result, SeedSyncError};

struct Cached {
    manifest: Arc<Manifest>,
    built_at: Instant,
}

#[derive(Clone)]
pub struct ManifestCache {
    root: Arc<PathBuf>,
    version: Arc<str>,
    ttl: Duration,
    slot: Arc<Mutex<Option<Cached>>>,
    latest: Arc<watch::Sender<Option<Arc<Manifest>>>>,
}

impl ManifestCache {
    pub fn new(root: impl Into<PathBuf>, version: impl Into<Arc<str>>, ttl: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            root: Arc::new(root.into()),
            version: version.into(),
            ttl,
            slot: Arc::new(Mutex::new(None)),
            latest: Arc::new(latest),
        }
    }

    /// The manifest, rebuilt when the cached one is older than the TTL.
    pub async fn get(&self) -> Result<Arc<Manifest>> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.built_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.manifest));
            }
        }

        let root = self.root.as_ref().clone();
        let version = self.version.to_string();
        let outcome = tokio::task::spawn_blocking(move || ManifestBuilder::new(root, version).build())
            .await
            .map_err(|e| SeedSyncError::Task(e.to_string()))??;

        let manifest = Arc::new(outcome.manifest);
        *slot = Some(Cached {
            manifest: Arc::clone(&manifest),
            built_at: Instant::now(),
        });
        self.latest.send_replace(Some(Arc::clone(&manifest)));
        Ok(manifest)
    }

    /// Last built manifest without touching the filesystem.
    pub fn peek(&self) -> Option<Arc<Manifest>> {
        self.latest.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reuses_within_ttl() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let cache = ManifestCache::new(dir.path(), "1.0", Duration::from_secs(60));
        assert!(cache.peek().is_none());

        let first = cache.get().await.unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        let second = cache.get().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 1);
        assert_eq!(cache.peek().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rebuilds_after_ttl() {
        let dir = TempDir::new().unwrap();
        let cache = ManifestCache::new(dir.path(), "1.0", Duration::ZERO);

        assert!(cache.get().await.unwrap().is_empty());
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        assert_eq!(cache.get().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let cache = ManifestCache::new(dir.path().join("gone"), "1.0", Duration::ZERO);
        assert!(matches!(cache.get().await, Err(SeedSyncError::ManifestBuild(_))));
    }
}
