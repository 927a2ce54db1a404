//! Error types for seedsync.
//!
//! Per-component errors are kept separate so callers can tell a fatal
//! condition (`ManifestBuildError`, `ApplyError`) from a per-cycle one
//! (`FetchError`, `VersionMismatchError`) without string matching.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Crate-wide error.
#[derive(Error, Debug)]
pub enum SeedSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error(transparent)]
    ManifestBuild(#[from] ManifestBuildError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    VersionMismatch(#[from] VersionMismatchError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    InvalidPath(#[from] InvalidPathError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<RemoteError> for SeedSyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Fetch(e) => SeedSyncError::Fetch(e),
            RemoteError::VersionMismatch(e) => SeedSyncError::VersionMismatch(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, SeedSyncError>;

/// The served root itself could not be walked.
#[derive(Error, Debug)]
pub enum ManifestBuildError {
    #[error("root directory {} does not exist", path.display())]
    MissingRoot { path: PathBuf },

    #[error("root {} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("root directory {} is unreadable: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which request a fetch failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPhase {
    Heartbeat,
    Manifest,
    File,
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchPhase::Heartbeat => "heartbeat",
            FetchPhase::Manifest => "manifest",
            FetchPhase::File => "file",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchCause {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("{0}")]
    Transport(String),
}

/// A network-level failure talking to one seed.
#[derive(Error, Debug, Clone)]
#[error("{phase} request to {seed} failed: {cause}")]
pub struct FetchError {
    pub phase: FetchPhase,
    pub seed: String,
    pub cause: FetchCause,
}

impl FetchError {
    pub fn new(phase: FetchPhase, seed: impl Into<String>, cause: FetchCause) -> Self {
        Self {
            phase,
            seed: seed.into(),
            cause,
        }
    }

    pub fn from_reqwest(phase: FetchPhase, seed: &str, err: &reqwest::Error) -> Self {
        let cause = if err.is_timeout() {
            FetchCause::Timeout
        } else if err.is_connect() {
            FetchCause::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            FetchCause::Status(status.as_u16())
        } else if err.is_decode() {
            FetchCause::Decode(err.to_string())
        } else {
            FetchCause::Transport(err.to_string())
        };
        Self::new(phase, seed, cause)
    }
}

/// The seed runs a build this node refuses to replicate from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("seed {seed} reports version {remote}, local version is {local}")]
pub struct VersionMismatchError {
    pub seed: String,
    pub local: String,
    pub remote: String,
}

/// Anything the fetcher can fail with.
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    VersionMismatch(#[from] VersionMismatchError),
}

/// Root-level failure while applying a change set.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("root directory {} is not available: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("all {failed} entries failed to apply")]
    AllEntriesFailed {
        failed: usize,
        report: crate::sync::apply::ApplyReport,
    },
}

/// A relative path that would resolve outside the served root.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid path {path:?}: {reason}")]
pub struct InvalidPathError {
    pub path: String,
    pub reason: &'static str,
}

/// Caller identity missing or not in the allow-list.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("client is not authorized")]
pub struct AuthorizationError;
