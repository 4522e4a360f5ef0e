//! Temp image deletion.
//!
//! Failures are logged and swallowed; callers never see them. A failed delete
//! is retried once after a short delay to ride out transient locks held by
//! virus scanners or a still-closing engine process.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Delete `path`, retrying once after `retry_delay`.
///
/// Returns true if the file is gone afterwards. A file that is already
/// missing counts as deleted.
pub async fn delete_temp_file(path: &Path, retry_delay: Duration) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => return true,
        Err(e) if e.kind() == ErrorKind::NotFound => return true,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to delete temp OCR file, retrying: {}", e);
        }
    }

    tokio::time::sleep(retry_delay).await;

    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            tracing::error!(path = %path.display(), "Error deleting temp OCR file: {}", e);
            false
        }
    }
}

/// Delete every path in order.
pub async fn delete_all(paths: Vec<PathBuf>, retry_delay: Duration) {
    for path in paths {
        delete_temp_file(&path, retry_delay).await;
    }
}

/// Delete `paths` without waiting, for use from `Drop`.
///
/// Falls back to a blocking delete when no runtime is available.
pub fn delete_detached(paths: Vec<PathBuf>, retry_delay: Duration) {
    if paths.is_empty() {
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(delete_all(paths, retry_delay));
        }
        Err(_) => {
            for path in paths {
                if let Err(e) = std::fs::remove_file(&path)
                    && e.kind() != ErrorKind::NotFound
                {
                    tracing::error!(path = %path.display(), "Error deleting temp OCR file: {}", e);
                }
            }
        }
    }
}

/// Files owed deletion by a future that may be dropped mid-await.
///
/// Paths still queued when the guard drops go to [`delete_detached`].
pub struct PendingDeletes {
    paths: Vec<PathBuf>,
    retry_delay: Duration,
}

impl PendingDeletes {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            paths: Vec::new(),
            retry_delay,
        }
    }

    pub fn push(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    pub fn extend(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.paths.extend(paths);
    }

    /// Delete every queued path. A path leaves the queue only once its
    /// delete, retry included, has finished.
    pub async fn flush(&mut self) {
        while let Some(path) = self.paths.last() {
            delete_temp_file(path, self.retry_delay).await;
            self.paths.pop();
        }
    }
}

impl Drop for PendingDeletes {
    fn drop(&mut self) {
        delete_detached(std::mem::take(&mut self.paths), self.retry_delay);
    }
}
