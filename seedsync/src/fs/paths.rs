//! Root-relative path handling.
//!
//! Every path that crosses the wire (a `?path=` query on the seed, a
//! manifest entry on the node) goes through [`resolve`] before it touches
//! the filesystem.

use std::path::{Component, Path, PathBuf};

use crate::manifest::TEMP_SUFFIX;
use crate::utils::errors::InvalidPathError;

fn invalid(path: &str, reason: &'static str) -> InvalidPathError {
    InvalidPathError {
        path: path.to_string(),
        reason,
    }
}

/// Check that `relative` is a plain slash-separated path that stays under
/// the root.
pub fn validate(relative: &str) -> Result<(), InvalidPathError> {
    if relative.is_empty() {
        return Err(invalid(relative, "empty path"));
    }
    if relative.contains('\0') {
        return Err(invalid(relative, "contains NUL byte"));
    }
    if relative.contains('\\') {
        return Err(invalid(relative, "contains backslash"));
    }
    let bytes = relative.as_bytes();
    let drive_prefix = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if relative.starts_with('/') || drive_prefix {
        return Err(invalid(relative, "absolute path"));
    }
    for segment in relative.split('/') {
        match segment {
            "" => return Err(invalid(relative, "empty path segment")),
            "." | ".." => return Err(invalid(relative, "path escapes root")),
            _ => {}
        }
    }
    Ok(())
}

/// Join a validated relative path onto the root.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf, InvalidPathError> {
    validate(relative)?;
    let joined = root.join(relative);
    // Component check guards against platform-specific prefixes.
    let escapes = Path::new(relative)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(invalid(relative, "path escapes root"));
    }
    Ok(joined)
}

/// Render a path under `root` as a slash-separated relative string.
/// Returns `None` for non-UTF-8 names.
pub fn to_relative(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// Temporary sibling used while downloading `destination`.
pub fn temp_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}{TEMP_SUFFIX}"))
}

/// Names produced by [`temp_path`]: a leading dot, a non-empty original
/// name, then the suffix.
pub fn is_temp_name(name: &str) -> bool {
    name.strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(TEMP_SUFFIX))
        .is_some_and(|original| !original.is_empty())
}

/// Fail when a directory between `root` and `relative` already exists as a
/// symbolic link. Writing through such a link would land outside the root.
/// Missing directories are fine; they are created on demand.
pub async fn check_parents(root: &Path, relative: &str) -> Result<(), InvalidPathError> {
    let mut current = root.to_path_buf();
    let mut segments = relative.split('/').peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            break;
        }
        current.push(segment);
        match tokio::fs::symlink_metadata(&current).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(invalid(relative, "parent directory is a symbolic link"));
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    Ok(())
}
