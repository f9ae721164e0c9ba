//! Pluggable persistence for project resources and compiled PDFs.
//!
//! The compiler depends only on the [`Storage`] trait. Two backends ship
//! with the crate:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`LocalStorage`]  | Development: a directory tree `<base>/<project_id>/…` |
//! | [`ObjectStorage`] | Production: a Supabase Storage bucket over its REST API |
//!
//! Both list project resources (images, class files), turn a stored path
//! into a URL a [`crate::fetch::Fetcher`] can download, and persist the
//! compiled PDF under `<project_id>/<filename>`.

mod local;
mod object;

pub use local::LocalStorage;
pub use object::ObjectStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One file stored for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectResource {
    /// File name, e.g. `thesis.cls`.
    pub name: String,
    /// Storage-relative path, e.g. `project123/thesis.cls`.
    pub path: String,
    pub size: u64,
    /// RFC 3339 modification time when the backend reports one.
    pub modified: Option<String>,
}

/// Where a saved PDF ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Storage-relative path, e.g. `project123/paper.pdf`.
    pub path: String,
    /// URL the client can open (relative for local storage, signed for buckets).
    pub url: String,
}

/// Which backend is in use; reported back to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Local,
    Object,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Local => f.write_str("local"),
            StorageKind::Object => f.write_str("supabase"),
        }
    }
}

/// Capability interface over the storage backends.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    fn kind(&self) -> StorageKind;

    /// List every file stored for a project.
    async fn list_project_resources(
        &self,
        project_id: &str,
    ) -> Result<Vec<ProjectResource>, StorageError>;

    /// Turn a storage-relative path into a downloadable URL.
    async fn resolve_image_url(&self, path: &str) -> Result<String, StorageError>;

    /// Persist a compiled PDF as `<project_id>/<filename>`.
    async fn save_pdf(
        &self,
        pdf_path: &Path,
        project_id: &str,
        filename: &str,
    ) -> Result<StoredObject, StorageError>;

    async fn pdf_exists(&self, project_id: &str, filename: &str) -> Result<bool, StorageError>;

    async fn pdf_url(&self, project_id: &str, filename: &str) -> Result<String, StorageError>;
}

/// Reject empty paths, absolute paths and `..` segments.
pub(crate) fn validate_relative(path: &str) -> Result<(), StorageError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.starts_with('\\')
        || path.split(['/', '\\']).any(|seg| seg == "..");
    if bad {
        Err(StorageError::InvalidPath {
            path: path.to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_validated() {
        assert!(validate_relative("p/images/a.png").is_ok());
        assert!(validate_relative("p/thesis.cls").is_ok());
        assert!(validate_relative("").is_err());
        assert!(validate_relative("/etc/passwd").is_err());
        assert!(validate_relative("p/../../etc/passwd").is_err());
        assert!(validate_relative("p\\..\\x").is_err());
    }

    #[test]
    fn kind_display_matches_api_names() {
        assert_eq!(StorageKind::Local.to_string(), "local");
        assert_eq!(StorageKind::Object.to_string(), "supabase");
    }
}
