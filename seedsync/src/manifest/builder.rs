//! Builds a [`Manifest`] from the files under a root directory.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Fingerprint, Manifest, ManifestEntry};
use crate::fs::walker::{walk_files, WalkFailure};
use crate::utils::errors::ManifestBuildError;

/// A file left out of a manifest, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

impl From<WalkFailure> for SkippedEntry {
    fn from(failure: WalkFailure) -> Self {
        Self {
            path: failure.path,
            reason: failure.reason,
        }
    }
}

/// Result of a build: the manifest plus the entries that had to be skipped.
#[derive(Debug)]
pub struct BuildOutcome {
    pub manifest: Manifest,
    pub skipped: Vec<SkippedEntry>,
}

pub struct ManifestBuilder {
    root: PathBuf,
    server_version: String,
}

impl ManifestBuilder {
    pub fn new(root: impl Into<PathBuf>, server_version: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            server_version: server_version.into(),
        }
    }

    /// Walk and fingerprint the whole tree. Blocking; run it on a blocking
    /// thread from async code.
    pub fn build(&self) -> Result<BuildOutcome, ManifestBuildError> {
        check_root(&self.root)?;

        let walk = walk_files(&self.root).map_err(|source| ManifestBuildError::Unreadable {
            path: self.root.clone(),
            source,
        })?;

        let mut skipped: Vec<SkippedEntry> = walk.failures.into_iter().map(Into::into).collect();
        let mut entries = Vec::with_capacity(walk.files.len());

        for file in walk.files {
            // Size comes from the bytes actually hashed so size and
            // fingerprint always describe the same content.
            match Fingerprint::of_file(&file.path) {
                Ok((fingerprint, size)) => entries.push(ManifestEntry {
                    path: file.relative_path,
                    size,
                    fingerprint,
                    mode: file.metadata.mode,
                    modified: file.metadata.modified,
                }),
                Err(err) => skipped.push(SkippedEntry {
                    path: file.path,
                    reason: err.to_string(),
                }),
            }
        }

        for entry in &skipped {
            warn!(path = %entry.path.display(), reason = %entry.reason, "Skipping entry while building manifest");
        }

        let manifest = Manifest::new(self.server_version.clone(), entries);
        debug!(
            root = %self.root.display(),
            files = manifest.len(),
            bytes = manifest.total_bytes(),
            skipped = skipped.len(),
            "Built manifest"
        );

        Ok(BuildOutcome { manifest, skipped })
    }
}

fn check_root(root: &Path) -> Result<(), ManifestBuildError> {
    let metadata = std::fs::metadata(root).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ManifestBuildError::MissingRoot {
                path: root.to_path_buf(),
            }
        } else {
            ManifestBuildError::Unreadable {
                path: root.to_path_buf(),
                source,
            }
        }
    })?;

    if !metadata.is_dir() {
        return Err(ManifestBuildError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    std::fs::read_dir(root).map_err(|source| ManifestBuildError::Unreadable {
        path: root.to_path_buf(),
        source,
    })?;

    Ok(())
}
