//! Tunnel context persistence for surviving restarts.
//!
//! The context blob contains the session key, so it is written with
//! owner-only permissions. The file holds the provider name next to the
//! opaque context bytes so a registry can restore it later:
//!
//! ```text
//! {"provider":"wc","context":{...}}
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct StoredContextRef<'a> {
    provider: &'a str,
    context: &'a RawValue,
}

#[derive(Deserialize)]
struct StoredContext {
    provider: String,
    context: Box<RawValue>,
}

/// A context read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedContext {
    /// Registry name of the provider that produced the context.
    pub provider: String,
    /// Context bytes as returned by `Tunnel::context`.
    pub context: Vec<u8>,
}

/// Writes `context` for `provider` to `path`, creating parent directories.
pub fn write_context(path: &Path, provider: &str, context: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let context = std::str::from_utf8(context).context("Tunnel context is not UTF-8")?;
    let context: &RawValue =
        serde_json::from_str(context).context("Tunnel context is not valid JSON")?;
    let stored = serde_json::to_vec(&StoredContextRef { provider, context })?;

    fs::write(path, stored).with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    log::info!("Saved tunnel context to {}", path.display());
    Ok(())
}

/// Reads a context written by [`write_context`].
///
/// Returns `Ok(None)` if nothing has been saved.
pub fn read_context(path: &Path) -> Result<Option<SavedContext>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let stored: StoredContext = serde_json::from_slice(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(Some(SavedContext {
        provider: stored.provider,
        context: stored.context.get().as_bytes().to_vec(),
    }))
}

/// Removes a saved context. Returns whether a file was deleted.
pub fn delete_context(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path).with_context(|| format!("Failed to delete {}", path.display()))?;
    log::info!("Deleted tunnel context {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONTEXT: &[u8] = br#"{"selfId":"a","status":"connected"}"#;

    #[test]
    fn test_write_read_delete() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/session.json");

        assert_eq!(read_context(&path).unwrap(), None);

        write_context(&path, "wc", CONTEXT).unwrap();
        let saved = read_context(&path).unwrap().unwrap();
        assert_eq!(saved.provider, "wc");
        assert_eq!(saved.context, CONTEXT);

        assert!(delete_context(&path).unwrap());
        assert!(!delete_context(&path).unwrap());
        assert_eq!(read_context(&path).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_context_file_is_owner_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        write_context(&path, "wc", CONTEXT).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_write_rejects_non_json_context() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        assert!(write_context(&path, "wc", b"not json").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_read_corrupt_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        fs::write(&path, "garbage").unwrap();
        assert!(read_context(&path).is_err());
    }
}
