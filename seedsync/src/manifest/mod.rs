//! Manifest model: a sorted, fingerprinted snapshot of a directory tree.
//!
//! Manifests are what seeds serve and what nodes diff against. Entries are
//! kept sorted by path so two manifests can be compared with a single merge.

pub mod builder;
pub mod diff;
pub mod fingerprint;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use builder::{BuildOutcome, ManifestBuilder, SkippedEntry};
pub use diff::{diff, ChangeSet};
pub use fingerprint::{Fingerprint, Fingerprinter};

/// Unix file-type bits for a regular file.
pub const MODE_REGULAR: u32 = 0o100000;
const MODE_TYPE_MASK: u32 = 0o170000;

/// Suffix of in-progress downloads. Never listed, never served.
pub const TEMP_SUFFIX: &str = ".seedsync-part";

/// One file under the served root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Slash-separated path relative to the root.
    pub path: String,
    pub size: u64,
    pub fingerprint: Fingerprint,
    /// Unix mode (type + permission bits).
    pub mode: u32,
    /// Last modification, seconds since the epoch. Informational only.
    #[serde(default)]
    pub modified: u64,
}

impl ManifestEntry {
    pub fn is_regular_file(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_REGULAR
    }

    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Snapshot of a root directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: DateTime<Utc>,
    pub server_version: String,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest from entries in any order. Later duplicates of a
    /// path are dropped.
    pub fn new(server_version: impl Into<String>, mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup_by(|later, earlier| later.path == earlier.path);
        Self {
            generated_at: Utc::now(),
            server_version: server_version.into(),
            entries,
        }
    }

    /// Check the ordering invariant on a manifest received from the network.
    pub fn validate(&self) -> Result<(), String> {
        for pair in self.entries.windows(2) {
            if pair[0].path >= pair[1].path {
                return Err(format!(
                    "entries out of order or duplicated at {:?}",
                    pair[1].path
                ));
            }
        }
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries
            .binary_search_by(|entry| entry.path.as_str().cmp(path))
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|entry| entry.size).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn entry(path: &str, content: &[u8]) -> ManifestEntry {
    ManifestEntry {
        path: path.to_string(),
        size: content.len() as u64,
        fingerprint: Fingerprint::of_bytes(content),
        mode: MODE_REGULAR | 0o644,
        modified: 0,
    }
}
