//! Directory traversal that tolerates per-entry failures.
//!
//! A single unreadable file or dangling symlink must not stop a seed from
//! serving the rest of its tree, so entry-level problems are collected
//! alongside the files instead of aborting the walk.

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use super::metadata::FileMetadata;
use super::paths;

/// A regular file discovered during walking.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Slash-separated path relative to the root
    pub relative_path: String,

    pub metadata: FileMetadata,
}

/// An entry the walk could not (or would not) include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub files: Vec<FileInfo>,
    pub failures: Vec<WalkFailure>,
}

/// Walk `root` collecting regular files.
///
/// Symbolic links are never followed and are reported as failures, as are
/// entries that cannot be stat'ed or whose names are not UTF-8. In-progress
/// download files are silently ignored. Only an error on the root itself is
/// returned as `Err`.
pub fn walk_files(root: &Path) -> std::io::Result<WalkOutcome> {
    let mut outcome = WalkOutcome::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("root walk failed")));
            }
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                outcome.failures.push(WalkFailure {
                    path,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if file_type.is_symlink() {
            outcome.failures.push(WalkFailure {
                path: entry.path().to_path_buf(),
                reason: "symbolic link".to_string(),
            });
            continue;
        }
        if !file_type.is_file() {
            outcome.failures.push(WalkFailure {
                path: entry.path().to_path_buf(),
                reason: "not a regular file".to_string(),
            });
            continue;
        }
        if is_temp(&entry) {
            debug!(path = %entry.path().display(), "Skipping temporary download file");
            continue;
        }

        match file_info(&entry, root) {
            Ok(info) => outcome.files.push(info),
            Err(reason) => outcome.failures.push(WalkFailure {
                path: entry.path().to_path_buf(),
                reason,
            }),
        }
    }

    Ok(outcome)
}

/// Paths of leftover download files under `root`.
pub fn find_temp_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_temp(entry))
        .map(DirEntry::into_path)
        .collect()
}

fn is_temp(entry: &DirEntry) -> bool {
    paths::is_temp_name(&entry.file_name().to_string_lossy())
}

fn file_info(entry: &DirEntry, root: &Path) -> Result<FileInfo, String> {
    let metadata = entry.metadata().map_err(|e| e.to_string())?;
    let relative_path =
        paths::to_relative(root, entry.path()).ok_or_else(|| "path is not valid UTF-8".to_string())?;

    Ok(FileInfo {
        path: entry.path().to_path_buf(),
        relative_path,
        metadata: FileMetadata::from_metadata(&metadata),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let outcome = walk_files(temp_dir.path())?;
        assert!(outcome.files.is_empty());
        assert!(outcome.failures.is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let outcome = walk_files(temp_dir.path())?;
        let mut paths: Vec<_> = outcome.files.iter().map(|f| f.relative_path.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec!["file1.txt", "subdir/file2.txt"]);

        Ok(())
    }

    #[test]
    fn test_temp_files_are_invisible() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("file.txt"), b"keep")?;
        fs::write(temp_dir.path().join(".file.txt.seedsync-part"), b"partial")?;

        let outcome = walk_files(temp_dir.path())?;
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].relative_path, "file.txt");
        assert_eq!(find_temp_files(temp_dir.path()).len(), 1);

        Ok(())
    }

    #[test]
    fn test_suffix_alone_is_not_a_temp_file() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("backup.seedsync-part"), b"real data")?;

        let outcome = walk_files(temp_dir.path())?;
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].relative_path, "backup.seedsync-part");
        assert!(find_temp_files(temp_dir.path()).is_empty());

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_are_reported() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("real.txt"), b"data")?;
        std::os::unix::fs::symlink("/etc/hostname", temp_dir.path().join("link"))?;

        let outcome = walk_files(temp_dir.path())?;
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].reason, "symbolic link");

        Ok(())
    }

    #[test]
    fn test_missing_root_is_an_error() {
        assert!(walk_files(Path::new("/nonexistent_path_12345")).is_err());
    }
}
