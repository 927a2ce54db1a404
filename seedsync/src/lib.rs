//! Seedsync Library
//!
//! Seed-to-node directory replication over HTTP(S): seeds serve a manifest
//! of their tree and the files in it, nodes pull and apply the difference.

pub mod api;
pub mod config;
pub mod daemon;
pub mod fs;
pub mod manifest;
pub mod protocol;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use manifest::{Manifest, ManifestEntry};
pub use utils::errors::SeedSyncError;
pub type Result<T> = std::result::Result<T, SeedSyncError>;
