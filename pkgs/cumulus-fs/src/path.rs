//! Helpers for the slash-separated paths used by the remote tree
//!
//! Every path handled by the engine is absolute, uses `/` as separator and
//! has no trailing slash, except the root which is exactly `/`.

use crate::error::FsError;

pub const ROOT: &str = "/";

/// Normalize a user or router supplied path.
///
/// Repeated separators are collapsed and a trailing slash is dropped.
/// Relative segments (`.` and `..`) are rejected rather than resolved.
pub fn normalize(path: &str) -> Result<String, FsError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(FsError::InvalidPath("path cannot be empty".to_string()));
    }

    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" => continue,
            "." | ".." => {
                return Err(FsError::InvalidPath(format!(
                    "relative segment in path: {}",
                    path
                )))
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        Ok(ROOT.to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

pub fn is_root(path: &str) -> bool {
    path == ROOT
}

/// Parent of a normalized path, `None` for the root
pub fn parent(path: &str) -> Option<&str> {
    if is_root(path) {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(index) => Some(&path[..index]),
        None => None,
    }
}

/// Last segment of a normalized path, empty for the root
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// Append a single name to a normalized directory path
pub fn join(directory: &str, name: &str) -> Result<String, FsError> {
    validate_name(name)?;
    if is_root(directory) {
        Ok(format!("/{}", name))
    } else {
        Ok(format!("{}/{}", directory, name))
    }
}

/// A node name must be a single, non-empty path segment
pub fn validate_name(name: &str) -> Result<(), FsError> {
    if name.trim().is_empty() {
        return Err(FsError::InvalidPath("name cannot be empty".to_string()));
    }
    if name.contains('/') {
        return Err(FsError::InvalidPath(format!(
            "name cannot contain '/': {}",
            name
        )));
    }
    if name == "." || name == ".." {
        return Err(FsError::InvalidPath(format!("reserved name: {}", name)));
    }
    Ok(())
}

/// True when `path` is `ancestor` itself or lies somewhere below it
pub fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
    if is_root(ancestor) || ancestor == path {
        return true;
    }
    path.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}
