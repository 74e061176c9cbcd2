//! Durable file primitives for the runtime's persistent state.
//!
//! Every durable update goes through write-temp-then-rename so a crash
//! mid-write can never leave a half-written store, and files are owner-only.

use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Atomically replace `path` with `bytes`, owner read/write only.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Storage(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(parent)
        .map_err(|e| Error::Storage(format!("create {}: {}", parent.display(), e)))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Storage(format!("no file name in {}", path.display())))?;
    let tmp = parent.join(format!("{}.tmp", file_name.to_string_lossy()));

    fs::write(&tmp, bytes).map_err(|e| Error::Storage(format!("write {}: {}", tmp.display(), e)))?;
    restrict_permissions(&tmp)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::Storage(format!("rename {} -> {}: {}", tmp.display(), path.display(), e))
    })?;

    Ok(())
}

/// Atomically replace `path` with the JSON rendering of `value`.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::Storage(format!("serialize {}: {}", path.display(), e)))?;
    atomic_write(path, &bytes)
}

/// Read a JSON store, returning `None` when the file does not exist yet.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Storage(format!("read {}: {}", path.display(), e))),
    };
    let value = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Storage(format!("parse {}: {}", path.display(), e)))?;
    Ok(Some(value))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| Error::Storage(format!("chmod {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
