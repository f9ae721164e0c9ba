use super::{validate_relative, ProjectResource, Storage, StorageKind, StoredObject};
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Filesystem storage rooted at `base_dir`.
///
/// Without a `public_base_url`, image URLs are `file://` URLs that
/// [`crate::fetch::HttpFetcher`] reads straight from disk. With one, they
/// point at `<public_base_url>/storage/<path>`, the layout a static file
/// server mounted on `base_dir` exposes.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
    public_base_url: Option<String>,
}

impl LocalStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            public_base_url: None,
        }
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn io_err(path: &Path, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn project_dir(&self, project_id: &str) -> Result<PathBuf, StorageError> {
        validate_relative(project_id)?;
        Ok(self.base_dir.join(project_id))
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.base_dir)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn public_url(&self, rel: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/storage/{rel}"),
            None => format!("/storage/{rel}"),
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    async fn list_project_resources(
        &self,
        project_id: &str,
    ) -> Result<Vec<ProjectResource>, StorageError> {
        let project_dir = self.project_dir(project_id)?;
        if !tokio::fs::try_exists(&project_dir)
            .await
            .map_err(|e| Self::io_err(&project_dir, e))?
        {
            debug!("No storage directory for project {}", project_id);
            return Ok(Vec::new());
        }

        let mut resources = Vec::new();
        let mut pending = vec![project_dir];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
                error!("Error listing files for project {}: {}", project_id, e);
                Self::io_err(&dir, e)
            })?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Self::io_err(&dir, e))?
            {
                let path = entry.path();
                let meta = entry.metadata().await.map_err(|e| Self::io_err(&path, e))?;
                if meta.is_dir() {
                    pending.push(path);
                } else if meta.is_file() {
                    resources.push(ProjectResource {
                        name: entry.file_name().to_string_lossy().into_owned(),
                        path: self.relative(&path),
                        size: meta.len(),
                        modified: meta
                            .modified()
                            .ok()
                            .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
                    });
                }
            }
        }

        resources.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(resources)
    }

    async fn resolve_image_url(&self, path: &str) -> Result<String, StorageError> {
        let rel = path.strip_prefix("storage/").unwrap_or(path);
        validate_relative(rel)?;

        if self.public_base_url.is_some() {
            return Ok(self.public_url(rel));
        }

        let abs = std::path::absolute(self.base_dir.join(rel))
            .map_err(|e| Self::io_err(&self.base_dir, e))?;
        reqwest::Url::from_file_path(&abs)
            .map(|u| u.to_string())
            .map_err(|_| StorageError::InvalidPath {
                path: path.to_string(),
            })
    }

    async fn save_pdf(
        &self,
        pdf_path: &Path,
        project_id: &str,
        filename: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_relative(filename)?;
        let project_dir = self.project_dir(project_id)?;
        let target = project_dir.join(filename);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_err(parent, e))?;
        }

        tokio::fs::copy(pdf_path, &target).await.map_err(|e| {
            error!("Error saving PDF: {}", e);
            Self::io_err(&target, e)
        })?;

        let rel = self.relative(&target);
        Ok(StoredObject {
            url: self.public_url(&rel),
            path: rel,
        })
    }

    async fn pdf_exists(&self, project_id: &str, filename: &str) -> Result<bool, StorageError> {
        validate_relative(filename)?;
        let target = self.project_dir(project_id)?.join(filename);
        tokio::fs::try_exists(&target)
            .await
            .map_err(|e| Self::io_err(&target, e))
    }

    async fn pdf_url(&self, project_id: &str, filename: &str) -> Result<String, StorageError> {
        validate_relative(project_id)?;
        validate_relative(filename)?;
        Ok(self.public_url(&format!("{project_id}/{filename}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn seeded() -> (TempDir, LocalStorage) {
        let root = TempDir::new().unwrap();
        let images = root.path().join("project123/images");
        tokio::fs::create_dir_all(&images).await.unwrap();
        tokio::fs::write(images.join("foo.png"), b"PNGDATA").await.unwrap();
        tokio::fs::write(root.path().join("project123/thesis.cls"), b"\\ProvidesClass{thesis}")
            .await
            .unwrap();
        let storage = LocalStorage::new(root.path());
        (root, storage)
    }

    #[tokio::test]
    async fn lists_resources_recursively() {
        let (_root, storage) = seeded().await;
        let resources = storage.list_project_resources("project123").await.unwrap();
        let paths: Vec<&str> = resources.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["project123/images/foo.png", "project123/thesis.cls"]);
        assert_eq!(resources[0].name, "foo.png");
        assert_eq!(resources[0].size, 7);
        assert!(resources[0].modified.is_some());
    }

    #[tokio::test]
    async fn unknown_project_lists_nothing() {
        let (_root, storage) = seeded().await;
        assert!(storage.list_project_resources("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn image_url_is_file_url_without_public_base() {
        let (root, storage) = seeded().await;
        let url = storage
            .resolve_image_url("project123/images/foo.png")
            .await
            .unwrap();
        assert!(url.starts_with("file://"), "{url}");
        let path = reqwest::Url::parse(&url).unwrap().to_file_path().unwrap();
        assert_eq!(
            std::fs::canonicalize(path).unwrap(),
            std::fs::canonicalize(root.path().join("project123/images/foo.png")).unwrap()
        );
    }

    #[tokio::test]
    async fn storage_prefix_is_stripped() {
        let (_root, storage) = seeded().await;
        let storage = storage.with_public_base_url("http://localhost:8000/");
        let url = storage
            .resolve_image_url("storage/project123/images/foo.png")
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:8000/storage/project123/images/foo.png");
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (_root, storage) = seeded().await;
        let err = storage.resolve_image_url("project123/../../etc/passwd").await;
        assert!(matches!(err, Err(StorageError::InvalidPath { .. })));
        let err = storage.list_project_resources("..").await;
        assert!(matches!(err, Err(StorageError::InvalidPath { .. })));
    }

    #[tokio::test]
    async fn save_pdf_round_trip() {
        let (root, storage) = seeded().await;
        let pdf = root.path().join("output_x.pdf");
        tokio::fs::write(&pdf, b"%PDF-1.5").await.unwrap();

        assert!(!storage.pdf_exists("project123", "paper.pdf").await.unwrap());
        let stored = storage.save_pdf(&pdf, "project123", "paper.pdf").await.unwrap();
        assert_eq!(stored.path, "project123/paper.pdf");
        assert_eq!(stored.url, "/storage/project123/paper.pdf");
        assert!(storage.pdf_exists("project123", "paper.pdf").await.unwrap());
        assert_eq!(
            storage.pdf_url("project123", "paper.pdf").await.unwrap(),
            "/storage/project123/paper.pdf"
        );
        // Source is copied, not moved; the caller owns it.
        assert!(pdf.exists());
    }
}
