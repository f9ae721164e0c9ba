//! Image resolution: rewrite `\includegraphics` targets to sandbox files.
//!
//! Authors reference images by URL (`https://…`), by storage path
//! (`storage/…`) or by a path under their project (`<project_id>/images/…`).
//! None of these resolve inside the sandbox, so each is downloaded next to
//! `document.tex` under a deterministic name and the reference is rewritten.
//! Anything else (`figures/plot.pdf`) is a literal the author manages and is
//! left untouched.
//!
//! ## Naming
//!
//! Local names are `img_<h><ext>` where `<h>` is the first 16 hex digits of
//! SHA-256 over the original path text. The name depends on nothing but the
//! path, so it is stable across runs, platforms and fetch completion order.
//!
//! ## Ordering
//!
//! Downloads run concurrently, but rewriting happens afterwards in a single
//! pass over the spans collected up front, from the last span to the first,
//! so earlier byte offsets stay valid.

use crate::error::Tex2PdfError;
use crate::fetch::{is_url, Fetcher};
use crate::storage::Storage;
use futures::future::try_join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error};

static RE_INCLUDEGRAPHICS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\includegraphics(?:\[.*?\])?\{(.*?)\}").unwrap());

/// Prefix marking a storage-relative image path.
pub const STORAGE_PREFIX: &str = "storage/";

/// Extension assumed when the reference has none.
const DEFAULT_EXTENSION: &str = ".png";

/// One `\includegraphics` target found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Byte offset where the braced path starts.
    pub start: usize,
    /// Byte offset one past the end of the braced path.
    pub end: usize,
    pub path: String,
}

/// Where a resolvable image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Already a downloadable URL.
    Url(String),
    /// Needs [`Storage::resolve_image_url`] first.
    Stored(String),
}

/// Source text after image rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub text: String,
    /// Distinct images downloaded into the sandbox.
    pub fetched: usize,
}

/// Locate every image inclusion, in source order.
pub fn find_image_refs(source: &str) -> Vec<ImageRef> {
    RE_INCLUDEGRAPHICS
        .captures_iter(source)
        .filter_map(|caps| caps.get(1))
        .map(|m| ImageRef {
            start: m.start(),
            end: m.end(),
            path: m.as_str().to_string(),
        })
        .collect()
}

/// Decide whether `path` must be fetched; `None` leaves it untouched.
pub fn classify(path: &str, project_id: &str) -> Option<ImageSource> {
    if is_url(path) {
        Some(ImageSource::Url(path.to_string()))
    } else if path.starts_with(STORAGE_PREFIX)
        || (!project_id.is_empty() && path.starts_with(project_id))
    {
        Some(ImageSource::Stored(path.to_string()))
    } else {
        None
    }
}

/// Deterministic sandbox file name for an image path.
pub fn local_filename(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    let hex: String = digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("img_{hex}{}", extension_of(path))
}

/// Extension of the last path segment, query and fragment ignored.
fn extension_of(path: &str) -> String {
    let tail = if is_url(path) {
        reqwest::Url::parse(path)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    } else {
        path.split(['?', '#']).next().unwrap_or_default().to_string()
    };
    let name = tail.rsplit('/').next().unwrap_or_default();

    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{ext}")
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// Download every resolvable image into `sandbox` and rewrite the source.
///
/// Each distinct path is fetched once, all fetches concurrently. The first
/// failure aborts the whole resolution; no partially rewritten text is
/// returned.
pub async fn resolve_images(
    source: &str,
    sandbox: &Path,
    project_id: &str,
    storage: &dyn Storage,
    fetcher: &dyn Fetcher,
) -> Result<ResolvedSource, Tex2PdfError> {
    let refs: Vec<(ImageRef, ImageSource)> = find_image_refs(source)
        .into_iter()
        .filter_map(|r| {
            let src = classify(&r.path, project_id);
            if src.is_none() {
                debug!("Using original image path: {}", r.path);
            }
            src.map(|s| (r, s))
        })
        .collect();

    if refs.is_empty() {
        return Ok(ResolvedSource {
            text: source.to_string(),
            fetched: 0,
        });
    }

    let unique: BTreeMap<&str, &ImageSource> =
        refs.iter().map(|(r, s)| (r.path.as_str(), s)).collect();
    debug!(
        "Found {} image references ({} distinct) to fetch",
        refs.len(),
        unique.len()
    );

    try_join_all(
        unique
            .iter()
            .map(|(path, src)| fetch_image(path, src, sandbox, storage, fetcher)),
    )
    .await?;

    let mut text = source.to_string();
    for (r, _) in refs.iter().rev() {
        text.replace_range(r.start..r.end, &local_filename(&r.path));
    }

    debug!("Finished processing all images");
    Ok(ResolvedSource {
        text,
        fetched: unique.len(),
    })
}

async fn fetch_image(
    path: &str,
    src: &ImageSource,
    sandbox: &Path,
    storage: &dyn Storage,
    fetcher: &dyn Fetcher,
) -> Result<(), Tex2PdfError> {
    let fail = |reason: String| {
        error!("Error processing image {}: {}", path, reason);
        Tex2PdfError::ImageFetchFailed {
            path: path.to_string(),
            reason,
        }
    };

    let url = match src {
        ImageSource::Url(url) => url.clone(),
        ImageSource::Stored(stored) => {
            debug!("Getting URL for storage path: {}", stored);
            storage
                .resolve_image_url(stored)
                .await
                .map_err(|e| fail(e.to_string()))?
        }
    };

    let bytes = fetcher.get(&url).await.map_err(|e| fail(e.to_string()))?;

    let target = sandbox.join(local_filename(path));
    tokio::fs::write(&target, &bytes)
        .await
        .map_err(|e| fail(format!("writing {}: {e}", target.display())))?;
    debug!("Image {} saved as {}", path, target.display());
    Ok(())
}
