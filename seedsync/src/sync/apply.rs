//! Commits a [`ChangeSet`] to the local tree.
//!
//! Fetched files are streamed into a hidden temporary sibling, verified
//! against the manifest fingerprint, and renamed over the destination. A
//! reader holding the old file (or opening the path at any point) sees
//! either the complete old content or the complete new content.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fs::{metadata, paths, walker};
use crate::manifest::{ChangeSet, Fingerprint, Fingerprinter, ManifestEntry};
use crate::utils::errors::{ApplyError, FetchError, InvalidPathError, RemoteError};

/// Body of one file as it arrives from a seed.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Where the applier gets file content from.
#[async_trait]
pub trait FileSource: Send + Sync + 'static {
    async fn open(&self, path: &str) -> Result<ByteStream, RemoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryAction {
    Fetch,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum EntryStatus {
    Applied,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryOutcome {
    pub path: String,
    pub action: EntryAction,
    pub status: EntryStatus,
    /// Bytes written for fetched entries.
    pub bytes: u64,
}

impl EntryOutcome {
    fn new(path: &str, action: EntryAction, status: EntryStatus) -> Self {
        Self {
            path: path.to_string(),
            action,
            status,
            bytes: 0,
        }
    }
}

/// Per-entry results of one apply.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub outcomes: Vec<EntryOutcome>,
    /// Directories removed because deletions left them empty.
    pub pruned_dirs: usize,
    /// Leftover temporary files from an interrupted earlier run.
    pub swept_temp_files: usize,
}

impl ApplyReport {
    fn count(&self, pred: impl Fn(&EntryStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn applied(&self) -> usize {
        self.count(|s| matches!(s, EntryStatus::Applied))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, EntryStatus::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, EntryStatus::Failed(_)))
    }

    pub fn bytes_fetched(&self) -> u64 {
        self.outcomes.iter().map(|o| o.bytes).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, EntryStatus::Failed(_)))
    }
}

pub struct Applier {
    root: PathBuf,
    max_concurrent: usize,
    cancel: CancellationToken,
}

impl Applier {
    pub fn new(root: impl Into<PathBuf>, max_concurrent: usize) -> Self {
        Self {
            root: root.into(),
            max_concurrent: max_concurrent.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting new entries once `cancel` fires. Entries already being
    /// written finish their temp-then-rename sequence.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Apply `changes` under the root, pulling content from `source`.
    ///
    /// Deletes run first, then empty directories left behind are pruned,
    /// then fetches run with bounded parallelism. Per-entry failures land in
    /// the report; only a root-level problem or a batch where every entry
    /// failed is returned as an error.
    pub async fn apply<S: FileSource>(
        &self,
        changes: &ChangeSet,
        source: Arc<S>,
    ) -> Result<ApplyReport, ApplyError> {
        self.check_root().await?;

        let mut report = ApplyReport {
            swept_temp_files: self.sweep_temp_files().await,
            ..ApplyReport::default()
        };

        for path in &changes.to_delete {
            if self.cancel.is_cancelled() {
                report.outcomes.push(cancelled(path, EntryAction::Delete));
                continue;
            }
            report.outcomes.push(delete_one(&self.root, path).await);
        }

        // Only after every delete was attempted, so no directory is judged
        // empty while a sibling delete is still pending.
        report.pruned_dirs = prune_empty_dirs(&self.root, &changes.to_delete).await;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(changes.to_fetch.len());

        for entry in &changes.to_fetch {
            let sem = Arc::clone(&semaphore);
            let source = Arc::clone(&source);
            let cancel = self.cancel.clone();
            let root = self.root.clone();
            let entry = entry.clone();
            let path = entry.path.clone();

            let handle = tokio::spawn(async move {
                let permit = tokio::select! {
                    permit = sem.acquire_owned() => permit,
                    _ = cancel.cancelled() => return cancelled(&entry.path, EntryAction::Fetch),
                };
                if permit.is_err() || cancel.is_cancelled() {
                    return cancelled(&entry.path, EntryAction::Fetch);
                }

                fetch_one(&root, &entry, source.as_ref()).await
            });

            handles.push((path, handle));
        }

        for (path, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => EntryOutcome::new(
                    &path,
                    EntryAction::Fetch,
                    EntryStatus::Failed(format!("fetch task failed: {e}")),
                ),
            };
            report.outcomes.push(outcome);
        }

        for failure in report.failures() {
            if let EntryStatus::Failed(reason) = &failure.status {
                warn!(path = %failure.path, action = ?failure.action, "Failed to apply entry: {}", reason);
            }
        }

        // The root may have vanished underneath us.
        self.check_root().await?;

        let attempted = report.outcomes.len();
        let failed = report.failed();
        if attempted > 0 && failed == attempted {
            return Err(ApplyError::AllEntriesFailed { failed, report });
        }

        info!(
            applied = report.applied(),
            skipped = report.skipped(),
            failed,
            bytes = report.bytes_fetched(),
            "Applied change set"
        );

        Ok(report)
    }

    async fn check_root(&self) -> Result<(), ApplyError> {
        let metadata = tokio::fs::metadata(&self.root)
            .await
            .map_err(|source| ApplyError::Root {
                path: self.root.clone(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(ApplyError::Root {
                path: self.root.clone(),
                source: std::io::Error::other("not a directory"),
            });
        }
        Ok(())
    }

    async fn sweep_temp_files(&self) -> usize {
        let root = self.root.clone();
        let stale = tokio::task::spawn_blocking(move || walker::find_temp_files(&root))
            .await
            .unwrap_or_default();

        let mut removed = 0;
        for path in stale {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed stale temporary file");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), "Failed to remove stale temporary file: {}", e),
            }
        }
        removed
    }
}

fn cancelled(path: &str, action: EntryAction) -> EntryOutcome {
    EntryOutcome::new(path, action, EntryStatus::Skipped("cancelled".to_string()))
}

async fn delete_one(root: &Path, relative: &str) -> EntryOutcome {
    let target = match resolve_inside(root, relative).await {
        Ok(target) => target,
        Err(e) => {
            return EntryOutcome::new(relative, EntryAction::Delete, EntryStatus::Failed(e.to_string()))
        }
    };

    let status = match tokio::fs::remove_file(&target).await {
        Ok(()) => EntryStatus::Applied,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            EntryStatus::Skipped("already absent".to_string())
        }
        Err(e) => EntryStatus::Failed(e.to_string()),
    };
    EntryOutcome::new(relative, EntryAction::Delete, status)
}

/// Remove directories emptied by deletions, deepest first, never the root
/// and never a directory that still has content.
async fn prune_empty_dirs(root: &Path, deleted: &[String]) -> usize {
    let mut candidates = BTreeSet::new();
    for relative in deleted {
        let mut current = relative.as_str();
        while let Some((parent, _)) = current.rsplit_once('/') {
            candidates.insert(parent.to_string());
            current = parent;
        }
    }

    // Longest paths first so children go before their parents.
    let mut ordered: Vec<_> = candidates.into_iter().collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut removed = 0;
    for relative in ordered {
        let Ok(dir) = paths::resolve(root, &relative) else {
            continue;
        };
        // remove_dir refuses non-empty directories, which is the point.
        if tokio::fs::remove_dir(&dir).await.is_ok() {
            debug!(dir = %relative, "Removed empty directory");
            removed += 1;
        }
    }
    removed
}

async fn fetch_one<S: FileSource + ?Sized>(root: &Path, entry: &ManifestEntry, source: &S) -> EntryOutcome {
    let destination = match resolve_inside(root, &entry.path).await {
        Ok(destination) => destination,
        Err(e) => {
            return EntryOutcome::new(&entry.path, EntryAction::Fetch, EntryStatus::Failed(e.to_string()))
        }
    };

    if already_current(&destination, entry).await {
        return EntryOutcome::new(
            &entry.path,
            EntryAction::Fetch,
            EntryStatus::Skipped("already up to date".to_string()),
        );
    }

    let temp = paths::temp_path(&destination);
    match download(&destination, &temp, entry, source).await {
        Ok(bytes) => EntryOutcome {
            path: entry.path.clone(),
            action: EntryAction::Fetch,
            status: EntryStatus::Applied,
            bytes,
        },
        Err(reason) => {
            let _ = tokio::fs::remove_file(&temp).await;
            EntryOutcome::new(&entry.path, EntryAction::Fetch, EntryStatus::Failed(reason))
        }
    }
}

/// Resolve an entry path, refusing any that would pass through a symlinked
/// directory already present under the root.
async fn resolve_inside(root: &Path, relative: &str) -> Result<PathBuf, InvalidPathError> {
    let resolved = paths::resolve(root, relative)?;
    paths::check_parents(root, relative).await?;
    Ok(resolved)
}

async fn already_current(destination: &Path, entry: &ManifestEntry) -> bool {
    match tokio::fs::metadata(destination).await {
        Ok(meta) if meta.is_file() && meta.len() == entry.size => {}
        _ => return false,
    }
    let path = destination.to_path_buf();
    match tokio::task::spawn_blocking(move || Fingerprint::of_file(&path)).await {
        Ok(Ok((fingerprint, _))) => fingerprint == entry.fingerprint,
        _ => false,
    }
}

async fn download<S: FileSource + ?Sized>(
    destination: &Path,
    temp: &Path,
    entry: &ManifestEntry,
    source: &S,
) -> Result<u64, String> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("cannot create directory {}: {}", parent.display(), e))?;
    }

    let mut stream = source.open(&entry.path).await.map_err(|e| e.to_string())?;
    let mut file = tokio::fs::File::create(temp)
        .await
        .map_err(|e| format!("cannot create temporary file: {e}"))?;
    let mut hasher = Fingerprinter::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        hasher.update(&chunk);
        if hasher.len() > entry.size {
            return Err(format!("received more than the expected {} bytes", entry.size));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("write failed: {e}"))?;
    }
    file.flush().await.map_err(|e| format!("flush failed: {e}"))?;
    file.sync_all().await.map_err(|e| format!("sync failed: {e}"))?;
    drop(file);

    let (fingerprint, size) = hasher.finish();
    if size != entry.size {
        return Err(format!("size mismatch: expected {} bytes, received {}", entry.size, size));
    }
    if fingerprint != entry.fingerprint {
        return Err(format!(
            "fingerprint mismatch: expected {}, received {}",
            entry.fingerprint, fingerprint
        ));
    }

    metadata::apply_permissions(temp, entry.mode)
        .map_err(|e| format!("cannot set permissions: {e}"))?;
    tokio::fs::rename(temp, destination)
        .await
        .map_err(|e| format!("rename into place failed: {e}"))?;

    debug!(path = %entry.path, bytes = size, "Fetched file");
    Ok(size)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::manifest::{diff, entry, Manifest, ManifestBuilder};
    use crate::utils::errors::{FetchCause, FetchPhase};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// In-memory seed content keyed by relative path.
    pub(crate) struct MemorySource {
        pub files: HashMap<String, Vec<u8>>,
    }

    impl MemorySource {
        pub(crate) fn new(files: &[(&str, &[u8])]) -> Arc<Self> {
            Arc::new(Self {
                files: files
                    .iter()
                    .map(|(path, data)| (path.to_string(), data.to_vec()))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl FileSource for MemorySource {
        async fn open(&self, path: &str) -> Result<ByteStream, RemoteError> {
            match self.files.get(path) {
                Some(data) => {
                    // Two chunks to exercise incremental hashing.
                    let (head, tail) = data.split_at(data.len() / 2);
                    let chunks = vec![Ok(Bytes::copy_from_slice(head)), Ok(Bytes::copy_from_slice(tail))];
                    Ok(futures_util::stream::iter(chunks).boxed())
                }
                None => Err(FetchError::new(FetchPhase::File, "memory", FetchCause::Status(404)).into()),
            }
        }
    }

    fn build(root: &Path) -> Manifest {
        ManifestBuilder::new(root, "1.0").build().unwrap().manifest
    }

    fn seed_tree(files: &[(&str, &[u8])]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, data) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, data).unwrap();
        }
        dir
    }

    const REMOTE: &[(&str, &[u8])] = &[
        ("a.txt", b"hash1"),
        ("b.txt", b"hash2"),
        ("assets/css/site.css", b"body { color: red }"),
        ("assets/js/app.js", b"console.log('v2')"),
    ];

    const LOCAL: &[(&str, &[u8])] = &[
        ("a.txt", b"hash1"),
        ("c.txt", b"hash3"),
        ("assets/js/app.js", b"console.log('v1')"),
        ("old/deep/stale.bin", b"\x00\x01"),
    ];

    #[tokio::test]
    async fn test_apply_converges_to_remote() {
        let seed = seed_tree(REMOTE);
        let node = seed_tree(LOCAL);
        let remote = build(seed.path());

        let changes = diff(&remote, &build(node.path()));
        let report = Applier::new(node.path(), 2)
            .apply(&changes, MemorySource::new(REMOTE))
            .await
            .unwrap();

        assert_eq!(report.failed(), 0);
        assert_eq!(report.applied(), 5);
        assert_eq!(report.pruned_dirs, 2);
        assert!(!node.path().join("old").exists());

        let rebuilt = build(node.path());
        assert!(diff(&remote, &rebuilt).is_empty());
        let remote_paths: Vec<_> = remote.entries.iter().map(|e| (&e.path, &e.fingerprint)).collect();
        let local_paths: Vec<_> = rebuilt.entries.iter().map(|e| (&e.path, &e.fingerprint)).collect();
        assert_eq!(remote_paths, local_paths);
    }

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let seed = seed_tree(REMOTE);
        let node = seed_tree(LOCAL);
        let changes = diff(&build(seed.path()), &build(node.path()));
        let applier = Applier::new(node.path(), 4);

        applier.apply(&changes, MemorySource::new(REMOTE)).await.unwrap();
        let first = build(node.path());

        let second_report = applier.apply(&changes, MemorySource::new(REMOTE)).await.unwrap();
        assert_eq!(second_report.failed(), 0);
        assert_eq!(second_report.applied(), 0);

        let second = build(node.path());
        assert!(diff(&first, &second).is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_transfer_is_rejected() {
        let node = TempDir::new().unwrap();
        let changes = ChangeSet {
            to_fetch: vec![entry("good.txt", b"good"), entry("bad.txt", b"expected")],
            ..ChangeSet::default()
        };
        let source = MemorySource::new(&[("good.txt", b"good"), ("bad.txt", b"tampered")]);

        let report = Applier::new(node.path(), 1).apply(&changes, source).await.unwrap();

        assert_eq!(report.applied(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!node.path().join("bad.txt").exists());
        assert!(walker::find_temp_files(node.path()).is_empty());
    }

    #[tokio::test]
    async fn test_every_entry_failing_is_an_error() {
        let node = TempDir::new().unwrap();
        let changes = ChangeSet {
            to_fetch: vec![entry("missing.txt", b"x")],
            ..ChangeSet::default()
        };

        let result = Applier::new(node.path(), 1)
            .apply(&changes, MemorySource::new(&[]))
            .await;
        assert!(matches!(result, Err(ApplyError::AllEntriesFailed { failed: 1, .. })));
    }

    #[tokio::test]
    async fn test_escaping_paths_from_seed_are_refused() {
        let node = TempDir::new().unwrap();
        let changes = ChangeSet {
            to_fetch: vec![entry("../escape.txt", b"x"), entry("fine.txt", b"y")],
            to_delete: vec!["../../etc/passwd".to_string()],
            ..ChangeSet::default()
        };
        let source = MemorySource::new(&[("../escape.txt", b"x"), ("fine.txt", b"y")]);

        let report = Applier::new(node.path(), 2).apply(&changes, source).await.unwrap();
        assert_eq!(report.failed(), 2);
        assert_eq!(report.applied(), 1);
        assert!(!node.path().parent().unwrap().join("escape.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_parent_is_not_followed() {
        let node = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("victim.txt"), b"keep").unwrap();
        std::os::unix::fs::symlink(outside.path(), node.path().join("dir")).unwrap();

        let changes = ChangeSet {
            to_fetch: vec![entry("dir/x.txt", b"payload"), entry("ok.txt", b"fine")],
            to_delete: vec!["dir/victim.txt".to_string()],
            ..ChangeSet::default()
        };
        let source = MemorySource::new(&[("dir/x.txt", &b"payload"[..]), ("ok.txt", &b"fine"[..])]);

        let report = Applier::new(node.path(), 2).apply(&changes, source).await.unwrap();
        assert_eq!(report.failed(), 2);
        assert_eq!(report.applied(), 1);
        assert!(!outside.path().join("x.txt").exists());
        assert_eq!(fs::read(outside.path().join("victim.txt")).unwrap(), b"keep");
        assert!(fs::symlink_metadata(node.path().join("dir")).unwrap().file_type().is_symlink());
    }

    /// Hands out content in small chunks with a pause between each.
    struct TrickleSource {
        data: Vec<u8>,
    }

    #[async_trait]
    impl FileSource for TrickleSource {
        async fn open(&self, _path: &str) -> Result<ByteStream, RemoteError> {
            let chunks: Vec<Result<Bytes, FetchError>> =
                self.data.chunks(64).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
            Ok(futures_util::stream::iter(chunks)
                .then(|chunk| async move {
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                    chunk
                })
                .boxed())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_readers_see_old_or_new_content_only() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let old = b"old content".to_vec();
        let new: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let node = seed_tree(&[("page.html", old.as_slice())]);
        let target = node.path().join("page.html");
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let done = Arc::clone(&done);
            let target = target.clone();
            let (old, new) = (old.clone(), new.clone());
            tokio::spawn(async move {
                let mut reads = 0usize;
                while !done.load(Ordering::SeqCst) {
                    let body = tokio::fs::read(&target).await.unwrap();
                    assert!(body == old || body == new, "torn read of {} bytes", body.len());
                    reads += 1;
                    tokio::task::yield_now().await;
                }
                reads
            })
        };

        let changes = ChangeSet {
            to_fetch: vec![entry("page.html", &new)],
            ..ChangeSet::default()
        };
        let report = Applier::new(node.path(), 1)
            .apply(&changes, Arc::new(TrickleSource { data: new.clone() }))
            .await
            .unwrap();
        done.store(true, Ordering::SeqCst);

        let reads = reader.await.unwrap();
        assert_eq!(report.applied(), 1);
        assert!(reads > 0);
        assert_eq!(fs::read(&target).unwrap(), new);
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let changes = ChangeSet::default();
        let result = Applier::new("/nonexistent_path_12345", 1)
            .apply(&changes, MemorySource::new(&[]))
            .await;
        assert!(matches!(result, Err(ApplyError::Root { .. })));
    }

    #[tokio::test]
    async fn test_stale_temp_files_are_swept() {
        let node = seed_tree(&[("keep.txt", b"k"), ("dir/.x.seedsync-part", b"partial")]);

        let report = Applier::new(node.path(), 1)
            .apply(&ChangeSet::default(), MemorySource::new(&[]))
            .await
            .unwrap();
        assert_eq!(report.swept_temp_files, 1);
        assert!(node.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_file_replaced_by_directory() {
        let node = seed_tree(&[("thing", b"was a file")]);
        let remote: &[(&str, &[u8])] = &[("thing/inside.txt", b"now a dir")];
        let seed = seed_tree(remote);

        let changes = diff(&build(seed.path()), &build(node.path()));
        let report = Applier::new(node.path(), 1)
            .apply(&changes, MemorySource::new(remote))
            .await
            .unwrap();

        assert_eq!(report.failed(), 0);
        assert_eq!(fs::read(node.path().join("thing/inside.txt")).unwrap(), b"now a dir");
    }

    #[tokio::test]
    async fn test_directory_replaced_by_file() {
        let node = seed_tree(&[("thing/inside.txt", b"dir content")]);
        let remote: &[(&str, &[u8])] = &[("thing", b"now a file")];
        let seed = seed_tree(remote);

        let changes = diff(&build(seed.path()), &build(node.path()));
        let report = Applier::new(node.path(), 1)
            .apply(&changes, MemorySource::new(remote))
            .await
            .unwrap();

        assert_eq!(report.failed(), 0);
        assert_eq!(fs::read(node.path().join("thing")).unwrap(), b"now a file");
    }

    #[tokio::test]
    async fn test_non_empty_directories_survive_pruning() {
        let node = seed_tree(&[("shared/gone.txt", b"1"), ("shared/untracked", b"2")]);
        let changes = ChangeSet {
            to_delete: vec!["shared/gone.txt".to_string()],
            ..ChangeSet::default()
        };

        let report = Applier::new(node.path(), 1)
            .apply(&changes, MemorySource::new(&[]))
            .await
            .unwrap();
        assert_eq!(report.pruned_dirs, 0);
        assert!(node.path().join("shared/untracked").exists());
    }

    #[tokio::test]
    async fn test_cancelled_apply_skips_remaining_work() {
        let node = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let changes = ChangeSet {
            to_fetch: vec![entry("a", b"a")],
            to_delete: vec!["b".to_string()],
            ..ChangeSet::default()
        };

        let report = Applier::new(node.path(), 1)
            .with_cancel(cancel)
            .apply(&changes, MemorySource::new(&[("a", b"a")]))
            .await
            .unwrap();
        assert_eq!(report.skipped(), 2);
        assert!(!node.path().join("a").exists());
    }
}
