//! Filesystem helpers: tree walking, metadata, and root-relative paths.

pub mod metadata;
pub mod paths;
pub mod walker;
