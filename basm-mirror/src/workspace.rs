//! Per-run scratch directory for the downloaded archive and its contents.
//!
//! The directory is created inside a caller-chosen base directory (usually
//! a mounted volume sized for multi-gigabyte images) and removed when the
//! [`ExtractionWorkspace`] is released or dropped, whichever comes first.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::MirrorError;

const WORKSPACE_PREFIX: &str = "stemcell-";

/// Exclusively owned scratch directory for a single mirror run.
#[derive(Debug)]
pub struct ExtractionWorkspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ExtractionWorkspace {
    /// Create a fresh directory under `base`.
    ///
    /// `base` must already exist and be writable. There is no fallback to the
    /// system temp directory.
    pub fn acquire(base: &Path) -> Result<Self, MirrorError> {
        let unavailable = |reason: String| MirrorError::WorkspaceUnavailable {
            path: base.to_path_buf(),
            reason,
        };

        let meta = fs::metadata(base).map_err(|e| unavailable(e.to_string()))?;
        if !meta.is_dir() {
            return Err(unavailable("not a directory".into()));
        }
        if meta.permissions().readonly() {
            return Err(unavailable("directory is read-only".into()));
        }

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(base)
            .map_err(|e| unavailable(e.to_string()))?;
        let path = dir.path().to_path_buf();
        tracing::debug!(path = %path.display(), "acquired extraction workspace");

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file directly inside the workspace.
    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Sorted names of the workspace's top-level entries.
    pub fn listing(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.path)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Remove the directory tree now. Removal errors are logged, never
    /// returned.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(dir) = self.dir.take() else { return };
        tracing::info!(path = %self.path.display(), "cleaning up extraction workspace");
        if let Err(err) = dir.close() {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove extraction workspace"
            );
        }
    }
}

impl Drop for ExtractionWorkspace {
    fn drop(&mut self) {
        self.remove();
    }
}
