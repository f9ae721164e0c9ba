use super::{validate_relative, ProjectResource, Storage, StorageKind, StoredObject};
use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error};

/// Signed image URLs stay valid for a week.
const IMAGE_URL_TTL_SECS: u64 = 60 * 60 * 24 * 7;
/// Signed PDF URLs stay valid for an hour.
const PDF_URL_TTL_SECS: u64 = 60 * 60;
/// Page size for bucket listings.
const LIST_PAGE: usize = 1000;

/// Supabase Storage bucket accessed through its REST API.
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    client: reqwest::Client,
    /// Project URL, e.g. `https://abc.supabase.co`.
    base_url: String,
    api_key: String,
    bucket: String,
}

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    /// `null` for folders.
    id: Option<String>,
    updated_at: Option<String>,
    metadata: Option<EntryMetadata>,
}

#[derive(Debug, Deserialize)]
struct EntryMetadata {
    size: Option<u64>,
}

#[derive(Debug, Serialize)]
struct SignRequest {
    #[serde(rename = "expiresIn")]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl ObjectStorage {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        bucket: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StorageError::Transport {
                path: base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            bucket: bucket.into(),
        })
    }

    fn endpoint(&self, action: &str, path: &str) -> String {
        if path.is_empty() {
            format!("{}/storage/v1/object/{action}/{}", self.base_url, self.bucket)
        } else {
            format!(
                "{}/storage/v1/object/{action}/{}/{path}",
                self.base_url, self.bucket
            )
        }
    }

    fn upload_endpoint(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{path}", self.base_url, self.bucket)
    }

    /// The sign endpoint returns a path relative to `/storage/v1`.
    fn absolute_signed_url(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            signed.to_string()
        } else {
            format!("{}/storage/v1{}", self.base_url, signed)
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.api_key).header("apikey", &self.api_key)
    }

    async fn send(
        &self,
        path: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StorageError> {
        let response = self
            .authed(req)
            .send()
            .await
            .map_err(|e| StorageError::Transport {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                path: path.to_string(),
            });
        }
        error!("Storage API error {} for {}: {}", status, path, body);
        Err(StorageError::Api {
            path: path.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn list_page(
        &self,
        prefix: &str,
        offset: usize,
    ) -> Result<Vec<ListEntry>, StorageError> {
        let req = self.client.post(self.endpoint("list", "")).json(&ListRequest {
            prefix,
            limit: LIST_PAGE,
            offset,
        });
        self.send(prefix, req)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Transport {
                path: prefix.to_string(),
                reason: e.to_string(),
            })
    }

    async fn sign(&self, path: &str, ttl_secs: u64) -> Result<String, StorageError> {
        let req = self
            .client
            .post(self.endpoint("sign", path))
            .json(&SignRequest {
                expires_in: ttl_secs,
            });
        let signed: SignResponse =
            self.send(path, req)
                .await?
                .json()
                .await
                .map_err(|e| StorageError::Transport {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(self.absolute_signed_url(&signed.signed_url))
    }
}

#[async_trait]
impl Storage for ObjectStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Object
    }

    /// Bucket listings are one level deep; folders are walked explicitly.
    async fn list_project_resources(
        &self,
        project_id: &str,
    ) -> Result<Vec<ProjectResource>, StorageError> {
        validate_relative(project_id)?;

        let mut resources = Vec::new();
        let mut pending = vec![project_id.to_string()];
        while let Some(prefix) = pending.pop() {
            let mut offset = 0;
            loop {
                let page = self.list_page(&prefix, offset).await?;
                let len = page.len();
                for entry in page {
                    let path = format!("{prefix}/{}", entry.name);
                    if entry.id.is_none() {
                        pending.push(path);
                        continue;
                    }
                    resources.push(ProjectResource {
                        name: entry.name,
                        path,
                        size: entry.metadata.and_then(|m| m.size).unwrap_or(0),
                        modified: entry.updated_at,
                    });
                }
                if len < LIST_PAGE {
                    break;
                }
                offset += len;
            }
        }

        debug!(
            "Listed {} objects for project {}",
            resources.len(),
            project_id
        );
        resources.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(resources)
    }

    async fn resolve_image_url(&self, path: &str) -> Result<String, StorageError> {
        let rel = path.strip_prefix("storage/").unwrap_or(path);
        validate_relative(rel)?;
        self.sign(rel, IMAGE_URL_TTL_SECS).await
    }

    async fn save_pdf(
        &self,
        pdf_path: &Path,
        project_id: &str,
        filename: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_relative(project_id)?;
        validate_relative(filename)?;
        let bucket_path = format!("{project_id}/{filename}");

        let bytes = tokio::fs::read(pdf_path)
            .await
            .map_err(|e| StorageError::Io {
                path: pdf_path.to_path_buf(),
                source: e,
            })?;
        let req = self
            .client
            .post(self.upload_endpoint(&bucket_path))
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes);
        self.send(&bucket_path, req).await?;

        let url = self.sign(&bucket_path, PDF_URL_TTL_SECS).await?;
        Ok(StoredObject {
            path: bucket_path,
            url,
        })
    }

    async fn pdf_exists(&self, project_id: &str, filename: &str) -> Result<bool, StorageError> {
        validate_relative(project_id)?;
        validate_relative(filename)?;
        let mut offset = 0;
        loop {
            let page = self.list_page(project_id, offset).await?;
            if page.iter().any(|e| e.id.is_some() && e.name == filename) {
                return Ok(true);
            }
            if page.len() < LIST_PAGE {
                return Ok(false);
            }
            offset += page.len();
        }
    }

    async fn pdf_url(&self, project_id: &str, filename: &str) -> Result<String, StorageError> {
        validate_relative(project_id)?;
        validate_relative(filename)?;
        self.sign(&format!("{project_id}/{filename}"), PDF_URL_TTL_SECS)
            .await
    }
}
