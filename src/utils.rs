//! Utility functions for hashing, identifiers and file placement

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// SHA-256 of an in-memory buffer as lowercase hex
pub fn bytes_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest(hasher)
}

/// Finalize a hasher into lowercase hex
pub fn hex_digest(hasher: Sha256) -> String {
    format!("{:x}", hasher.finalize())
}

/// Stable UUID (v5, DNS namespace) derived from a string
///
/// Used to give URL-shaped identifiers a filesystem-safe name.
pub fn uid_from_str(value: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_DNS, value.as_bytes()).to_string()
}

/// Expand a leading `~` to the current user's home directory
///
/// Paths without a leading `~` (and environments without a home directory)
/// are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

/// Sibling path used while a file is being written (`<name>.tmp`)
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write bytes to `path` through a `.tmp` sibling so readers never see partial files
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = partial_path(path);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Join a `/`-separated relative path onto a base directory
///
/// Empty, `.` and `..` segments are dropped so remote paths cannot escape `base`.
pub fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .fold(base.to_path_buf(), |acc, segment| acc.join(segment))
}
