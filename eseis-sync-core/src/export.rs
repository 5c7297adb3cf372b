//! Idempotent export of one remote item to one local artifact.
//!
//! The staleness check compares the item's remote update time with the local
//! file's modification time. A file strictly newer than the remote update is
//! kept as is, without any remote call. Anything else, equal timestamps
//! included, is (re)fetched and the file rewritten; rewriting stamps it with
//! the current time, which is what keeps the next run's comparison meaningful.
//!
//! This is a coarse heuristic: there is no content hash and no stored
//! manifest, so a remote edit whose timestamp predates the last local write
//! is never picked up.

use std::future::Future;
#[cfg(unix)]
use std::fs::Permissions;
use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::SyncError;

/// Mode of every exported file, instead of the temporary file's 0600.
#[cfg(unix)]
const EXPORTED_FILE_MODE: u32 = 0o644;

/// The minimal identity needed to decide staleness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportableItem {
    pub remote_id: String,
    pub display_name: String,
    pub remote_updated_at: DateTime<Utc>,
}

impl ExportableItem {
    pub fn new(
        remote_id: impl ToString,
        display_name: impl Into<String>,
        remote_updated_at: impl Into<DateTime<Utc>>,
    ) -> Self {
        Self {
            remote_id: remote_id.to_string(),
            display_name: display_name.into(),
            remote_updated_at: remote_updated_at.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportAction {
    Created,
    Skipped,
}

/// Pure staleness decision: should the item be fetched?
pub fn needs_fetch(remote_updated_at: DateTime<Utc>, local_modified: Option<SystemTime>) -> bool {
    match local_modified {
        None => true,
        Some(modified) => remote_updated_at >= DateTime::<Utc>::from(modified),
    }
}

fn local_modified(path: &Path) -> Result<Option<SystemTime>, SyncError> {
    match std::fs::metadata(path) {
        Ok(meta) => meta
            .modified()
            .map(Some)
            .map_err(|e| SyncError::filesystem(path, e)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => {
            error!(error = ?e, path = %path.display(), "[EXPORT] Failed to stat destination");
            Err(SyncError::filesystem(path, e))
        }
    }
}

/// Creates or overwrites `destination` with `fetch()`'s bytes unless the
/// existing file is newer than the item's remote update time.
///
/// Bytes are fetched before the destination is touched, then written through
/// a temporary file in the same directory and renamed into place.
pub async fn export_item<F, Fut>(
    item: &ExportableItem,
    destination: &Path,
    fetch: F,
) -> Result<ExportAction, SyncError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<u8>, SyncError>>,
{
    let modified = local_modified(destination)?;
    if !needs_fetch(item.remote_updated_at, modified) {
        info!(
            remote_id = %item.remote_id,
            name = %item.display_name,
            path = %destination.display(),
            "[EXPORT] Already up to date, skipping"
        );
        return Ok(ExportAction::Skipped);
    }

    info!(
        remote_id = %item.remote_id,
        name = %item.display_name,
        path = %destination.display(),
        replacing = modified.is_some(),
        "[EXPORT] Fetching"
    );
    let bytes = fetch().await.map_err(|e| {
        error!(error = %e, remote_id = %item.remote_id, "[EXPORT] Fetch failed");
        e
    })?;
    write_atomically(destination, &bytes)?;
    debug!(path = %destination.display(), size = bytes.len(), "[EXPORT] Written");
    Ok(ExportAction::Created)
}

/// Writes a pretty-printed JSON dump of `record`, replacing any existing file.
pub fn write_metadata<T: Serialize + ?Sized>(record: &T, path: &Path) -> Result<(), SyncError> {
    let json = serde_json::to_vec_pretty(record).map_err(|e| {
        error!(error = %e, path = %path.display(), "[EXPORT] Failed to encode metadata");
        SyncError::Encode {
            path: path.to_path_buf(),
            source: e,
        }
    })?;
    write_atomically(path, &json)?;
    debug!(path = %path.display(), "[EXPORT] Metadata written");
    Ok(())
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        error!(error = ?e, dir = %dir.display(), "[EXPORT] Failed to create temporary file");
        SyncError::filesystem(dir, e)
    })?;
    if let Err(e) = tmp.write_all(bytes).and_then(|()| tmp.flush()) {
        return Err(SyncError::filesystem(tmp.path(), e));
    }
    #[cfg(unix)]
    if let Err(e) = tmp
        .as_file()
        .set_permissions(Permissions::from_mode(EXPORTED_FILE_MODE))
    {
        return Err(SyncError::filesystem(tmp.path(), e));
    }
    tmp.persist(path).map_err(|e| {
        error!(error = ?e.error, path = %path.display(), "[EXPORT] Failed to move file into place");
        SyncError::filesystem(path, e.error)
    })?;
    Ok(())
}
