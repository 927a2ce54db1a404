//! Utility modules for seedsync.

pub mod duration;
pub mod errors;
pub mod logger;

pub use errors::{Result, SeedSyncError};
