//! Manifest comparison.

use std::cmp::Ordering;

use serde::Serialize;

use super::{Manifest, ManifestEntry};

/// What a node must do to make its tree match a remote manifest.
///
/// `to_fetch` and `to_delete` never share a path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    /// Remote entries that are missing locally or differ in content.
    pub to_fetch: Vec<ManifestEntry>,
    /// Local paths the remote no longer has.
    pub to_delete: Vec<String>,
    /// Paths with identical fingerprints on both sides.
    pub unchanged: Vec<String>,
}

impl ChangeSet {
    /// True when applying this change set would do nothing.
    pub fn is_empty(&self) -> bool {
        self.to_fetch.is_empty() && self.to_delete.is_empty()
    }

    pub fn fetch_bytes(&self) -> u64 {
        self.to_fetch.iter().map(|entry| entry.size).sum()
    }
}

/// Compare `remote` against `local` with a single merge pass.
///
/// Both manifests must be sorted by path (see [`Manifest::validate`]).
/// Any fingerprint difference, including one caused only by size, schedules
/// a full re-fetch.
pub fn diff(remote: &Manifest, local: &Manifest) -> ChangeSet {
    debug_assert!(remote.validate().is_ok());
    debug_assert!(local.validate().is_ok());

    let mut changes = ChangeSet::default();
    let mut remote_iter = remote.entries.iter().peekable();
    let mut local_iter = local.entries.iter().peekable();

    loop {
        match (remote_iter.peek(), local_iter.peek()) {
            (Some(r), Some(l)) => match r.path.cmp(&l.path) {
                Ordering::Less => {
                    changes.to_fetch.push((*r).clone());
                    remote_iter.next();
                }
                Ordering::Greater => {
                    changes.to_delete.push(l.path.clone());
                    local_iter.next();
                }
                Ordering::Equal => {
                    if r.fingerprint == l.fingerprint && r.size == l.size {
                        changes.unchanged.push(r.path.clone());
                    } else {
                        changes.to_fetch.push((*r).clone());
                    }
                    remote_iter.next();
                    local_iter.next();
                }
            },
            (Some(r), None) => {
                changes.to_fetch.push((*r).clone());
                remote_iter.next();
            }
            (None, Some(l)) => {
                changes.to_delete.push(l.path.clone());
                local_iter.next();
            }
            (None, None) => break,
        }
    }

    changes
}
