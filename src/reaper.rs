//! Stale-output reaper.
//!
//! Relocated PDFs (`output_<id>.pdf`) outlive their sandbox so the caller
//! can upload or serve them. Nothing else deletes them, so the reaper sweeps
//! the holding directory for artifacts older than a threshold. It only
//! touches files matching the artifact pattern and never fails the caller.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const ARTIFACT_PREFIX: &str = "output_";
const ARTIFACT_EXTENSION: &str = ".pdf";

/// Name of the relocated artifact for a sandbox id.
pub fn artifact_name(id: &str) -> String {
    format!("{ARTIFACT_PREFIX}{id}{ARTIFACT_EXTENSION}")
}

/// `true` for names the reaper may delete.
pub fn is_artifact_name(name: &str) -> bool {
    name.starts_with(ARTIFACT_PREFIX) && name.ends_with(ARTIFACT_EXTENSION)
}

/// `hours` as a [`Duration`], saturating instead of overflowing.
pub fn hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(60 * 60))
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapSummary {
    /// Artifacts examined.
    pub scanned: usize,
    pub deleted: usize,
    /// Artifacts that were old enough but could not be inspected or removed.
    pub failed: usize,
}

/// Delete artifacts in `dir` older than `max_age`.
pub async fn reap_stale_outputs(dir: &Path, max_age: Duration) -> ReapSummary {
    reap_stale_outputs_at(dir, max_age, SystemTime::now()).await
}

/// [`reap_stale_outputs`] with an explicit clock.
///
/// A file is deleted only when `now - mtime` is strictly greater than
/// `max_age`. Files stamped in the future are kept.
pub async fn reap_stale_outputs_at(dir: &Path, max_age: Duration, now: SystemTime) -> ReapSummary {
    let mut summary = ReapSummary::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Holding directory {} does not exist", dir.display());
            return summary;
        }
        Err(e) => {
            warn!("Error cleaning up old files in {}: {}", dir.display(), e);
            return summary;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Error cleaning up old files in {}: {}", dir.display(), e);
                break;
            }
        };

        let name = entry.file_name();
        if !is_artifact_name(&name.to_string_lossy()) {
            continue;
        }
        let path = entry.path();

        let modified = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta.modified(),
            Ok(_) => continue,
            Err(e) => Err(e),
        };
        summary.scanned += 1;

        match reap_entry(&path, modified, max_age, now).await {
            Reaped::Kept => {}
            Reaped::Deleted => summary.deleted += 1,
            Reaped::Failed => summary.failed += 1,
        }
    }

    if summary.deleted > 0 || summary.failed > 0 {
        info!(
            "Reaped {} of {} outputs in {} ({} failed)",
            summary.deleted,
            summary.scanned,
            dir.display(),
            summary.failed
        );
    }
    summary
}

#[derive(Debug, PartialEq, Eq)]
enum Reaped {
    Kept,
    Deleted,
    Failed,
}

/// Decide and act on one artifact. Failures are logged, never returned.
async fn reap_entry(
    path: &Path,
    modified: std::io::Result<SystemTime>,
    max_age: Duration,
    now: SystemTime,
) -> Reaped {
    let modified = match modified {
        Ok(t) => t,
        Err(e) => {
            warn!("Cannot read modification time of {}: {}", path.display(), e);
            return Reaped::Failed;
        }
    };

    // `duration_since` errs for mtimes in the future.
    let stale = matches!(now.duration_since(modified), Ok(age) if age > max_age);
    if !stale {
        return Reaped::Kept;
    }

    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed old file: {}", path.display());
            Reaped::Deleted
        }
        Err(e) => {
            warn!("Error removing {}: {}", path.display(), e);
            Reaped::Failed
        }
    }
}
