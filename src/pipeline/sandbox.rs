//! Per-compilation working directory with guaranteed teardown.
//!
//! A [`Sandbox`] wraps a [`tempfile::TempDir`] so the directory is removed
//! on every exit path: explicit [`Sandbox::close`] on normal return, `Drop`
//! on early `?` returns, panics, and futures dropped by an outer timeout.
//! Unlike a bare `TempDir`, removal failures are logged instead of being
//! swallowed silently, and never escalate.

use crate::error::Tex2PdfError;
use chrono::{DateTime, Local};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Timestamp layout shared by sandbox and artifact names.
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

const SANDBOX_PREFIX: &str = "compile_";

/// Render a compilation start time as a filename-safe stamp.
pub fn stamp(at: DateTime<Local>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Exclusively-owned build directory for one compilation attempt.
#[derive(Debug)]
pub struct Sandbox {
    dir: Option<TempDir>,
}

impl Sandbox {
    /// Create `compile_<stamp>_<suffix>` under `parent`.
    ///
    /// The random suffix only matters when two compilations start within the
    /// same microsecond.
    pub async fn create(parent: &Path, stamp: &str) -> Result<Self, Tex2PdfError> {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            Tex2PdfError::io(format!("Failed to create {}", parent.display()), e)
        })?;

        let prefix = format!("{SANDBOX_PREFIX}{stamp}_");
        let parent = parent.to_path_buf();
        // A dropped join handle still drops the `TempDir`, which removes it.
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(&prefix)
                .rand_bytes(4)
                .tempdir_in(&parent)
        })
        .await
        .map_err(|e| Tex2PdfError::Internal(format!("Working directory task failed: {e}")))?
        .map_err(|e| Tex2PdfError::io("Failed to create working directory", e))?;

        debug!("Working directory: {}", dir.path().display());
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            // `dir` is only taken by `close`/`drop`, which consume the sandbox.
            None => Path::new(""),
        }
    }

    /// `<stamp>_<suffix>`: the directory name without its `compile_` prefix.
    ///
    /// Unique among live sandboxes under the same parent, so it also names
    /// the relocated artifact.
    pub fn id(&self) -> String {
        let name = self
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.strip_prefix(SANDBOX_PREFIX)
            .map(str::to_string)
            .unwrap_or(name)
    }

    /// Delete the directory now, logging (not returning) any failure.
    pub fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("Cleaned up working directory: {}", path.display()),
                Err(e) => warn!("Error cleaning up working directory {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stamp_has_microseconds() {
        let at = Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .unwrap()
            + chrono::Duration::microseconds(42);
        assert_eq!(stamp(at), "20240309_140507_000042");
    }

    #[tokio::test]
    async fn close_removes_directory() {
        let parent = TempDir::new().unwrap();
        let sandbox = Sandbox::create(parent.path(), "20240101_000000_000001").await.unwrap();
        let path = sandbox.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("compile_20240101_000000_000001_"));

        std::fs::write(path.join("document.tex"), "x").unwrap();
        sandbox.close();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn drop_removes_directory() {
        let parent = TempDir::new().unwrap();
        let path = {
            let sandbox = Sandbox::create(parent.path(), "s").await.unwrap();
            std::fs::create_dir(sandbox.path().join("nested")).unwrap();
            sandbox.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn same_stamp_does_not_collide() {
        let parent = TempDir::new().unwrap();
        let a = Sandbox::create(parent.path(), "same").await.unwrap();
        let b = Sandbox::create(parent.path(), "same").await.unwrap();
        assert_ne!(a.path(), b.path());
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("same_"), "{}", a.id());
    }

    #[tokio::test]
    async fn creates_missing_parent() {
        let root = TempDir::new().unwrap();
        let parent = root.path().join("a/b");
        let sandbox = Sandbox::create(&parent, "s").await.unwrap();
        assert!(sandbox.path().starts_with(&parent));
    }

    #[tokio::test]
    async fn parent_under_a_file_is_io_error() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("plain");
        std::fs::write(&file, "x").unwrap();
        let err = Sandbox::create(&file.join("sub"), "s").await.unwrap_err();
        assert!(matches!(err, Tex2PdfError::Io { .. }), "{err:?}");
    }
}
