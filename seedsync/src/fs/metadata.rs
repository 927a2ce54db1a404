//! File metadata carried in manifests and restored on replicas.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// The parts of a file's metadata that seedsync replicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,

    /// Last modified time (seconds since Unix epoch)
    pub modified: u64,

    /// Unix mode (type and permission bits)
    pub mode: u32,
}

impl FileMetadata {
    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
            .unwrap_or_default()
            .as_secs();

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode()
        };

        #[cfg(not(unix))]
        let mode = if metadata.permissions().readonly() {
            crate::manifest::MODE_REGULAR | 0o444
        } else {
            crate::manifest::MODE_REGULAR | 0o644
        };

        Self {
            size: metadata.len(),
            modified,
            mode,
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_metadata(&fs::metadata(path)?))
    }
}

/// Apply permission bits from a manifest mode to a file.
#[cfg(unix)]
pub fn apply_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = mode & 0o7777;
    if permissions == 0 {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(permissions))
}

#[cfg(not(unix))]
pub fn apply_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
