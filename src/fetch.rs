//! Content retrieval for images and class files.
//!
//! ## Why a trait?
//!
//! The pipeline downloads from whatever URL storage hands back: signed
//! bucket URLs in production, `file://` URLs when the local storage backend
//! has no public base URL, and canned bytes in tests. [`Fetcher`] hides
//! which transport serves a given URL.

use crate::error::FetchError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Retrieves the full body behind a URL.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// [`Fetcher`] for `http://`, `https://` (reqwest) and `file://` (tokio fs).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    async fn get_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    async fn get_file(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| FetchError::UnsupportedUrl {
                url: url.to_string(),
            })?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("Fetching {}", url);
        if is_url(url) {
            self.get_http(url).await
        } else if url.starts_with("file://") {
            self.get_file(url).await
        } else {
            Err(FetchError::UnsupportedUrl {
                url: url.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/foo.png"));
        assert!(is_url("http://example.com/foo.png"));
        assert!(!is_url("storage/p/images/foo.png"));
        assert!(!is_url("file:///tmp/foo.png"));
        assert!(!is_url(""));
    }

    #[tokio::test]
    async fn reads_file_urls() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("foo.png");
        tokio::fs::write(&path, b"PNGDATA").await.unwrap();
        let url = reqwest::Url::from_file_path(&path).unwrap();

        let fetcher = HttpFetcher::new(5).unwrap();
        assert_eq!(fetcher.get(url.as_str()).await.unwrap(), b"PNGDATA");
    }

    #[tokio::test]
    async fn missing_file_is_transport_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = reqwest::Url::from_file_path(dir.path().join("nope.png")).unwrap();

        let fetcher = HttpFetcher::new(5).unwrap();
        let err = fetcher.get(url.as_str()).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn relative_urls_are_rejected() {
        let fetcher = HttpFetcher::new(5).unwrap();
        let err = fetcher.get("/storage/p/images/foo.png").await.unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedUrl { .. }));
    }
}
