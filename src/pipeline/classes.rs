//! Class-file provisioning.
//!
//! Projects may ship their own document classes (`thesis.cls`). The engine
//! finds a class either next to the source or in the personal TEXMF tree,
//! so each `.cls` is written to both, then `texhash` refreshes the tree's
//! file database once.
//!
//! Any list, fetch or write failure aborts provisioning before the engine
//! runs. A failing `texhash` only warns: a freshly written class in the
//! sandbox is still found without it.

use crate::config::CompilerConfig;
use crate::error::Tex2PdfError;
use crate::fetch::Fetcher;
use crate::process::{ProcessRequest, ProcessRunner};
use crate::storage::Storage;
use std::path::Path;
use tracing::{debug, info, warn};

const CLASS_EXTENSION: &str = ".cls";

/// Stage every project class file and refresh the TEXMF database.
///
/// Returns the number of class files staged.
pub async fn provision_class_files(
    sandbox: &Path,
    project_id: &str,
    storage: &dyn Storage,
    fetcher: &dyn Fetcher,
    runner: &dyn ProcessRunner,
    config: &CompilerConfig,
) -> Result<usize, Tex2PdfError> {
    let resources = storage
        .list_project_resources(project_id)
        .await
        .map_err(|e| Tex2PdfError::ProvisioningFailed {
            file: format!("{project_id}/*{CLASS_EXTENSION}"),
            reason: e.to_string(),
        })?;

    let classes: Vec<_> = resources
        .into_iter()
        .filter(|r| r.name.ends_with(CLASS_EXTENSION))
        .collect();
    if classes.is_empty() {
        debug!("No class files for project {}", project_id);
        return Ok(0);
    }

    let class_dir = config.class_dir();
    tokio::fs::create_dir_all(&class_dir)
        .await
        .map_err(|e| Tex2PdfError::ProvisioningFailed {
            file: class_dir.display().to_string(),
            reason: e.to_string(),
        })?;

    for class in &classes {
        let fail = |reason: String| Tex2PdfError::ProvisioningFailed {
            file: class.name.clone(),
            reason,
        };

        let url = storage
            .resolve_image_url(&class.path)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let bytes = fetcher.get(&url).await.map_err(|e| fail(e.to_string()))?;

        for target in [sandbox.join(&class.name), class_dir.join(&class.name)] {
            tokio::fs::write(&target, &bytes)
                .await
                .map_err(|e| fail(format!("writing {}: {e}", target.display())))?;
        }
        info!("Class file {} staged", class.name);
    }

    refresh_file_database(runner, config).await;
    Ok(classes.len())
}

/// Run `texhash <texmf_home>`; failures are logged and ignored.
async fn refresh_file_database(runner: &dyn ProcessRunner, config: &CompilerConfig) {
    let request = ProcessRequest::new(&config.texhash)
        .arg(config.texmf_home.to_string_lossy());
    match runner.run(&request).await {
        Ok(out) if out.success() => {
            debug!("{} refreshed {}", config.texhash, config.texmf_home.display())
        }
        Ok(out) => warn!(
            "{} exited with {:?}: {}",
            config.texhash,
            out.exit_code,
            out.stderr.trim()
        ),
        Err(e) => warn!("Could not run {}: {}", config.texhash, e),
    }
}
