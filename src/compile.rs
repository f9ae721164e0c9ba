//! Compilation entry points.
//!
//! [`LatexCompiler::compile`] runs one document through the pipeline inside
//! a private sandbox and hands back the relocated PDF. It is the only place
//! that knows the stage order:
//!
//! ```text
//! sandbox → class files → images → document.tex → pass 1 → pass 2
//!         → verify document.pdf → relocate → sandbox removed
//! ```
//!
//! Any failure skips straight to sandbox removal. The sandbox is removed
//! exactly once on every path, including when the future is dropped by an
//! outer timeout.
//!
//! [`LatexCompiler::compile_and_store`] is the publishing flow built on top:
//! compile under a deadline, persist through [`Storage`], then sweep stale
//! artifacts in the background.

use crate::config::CompilerConfig;
use crate::error::Tex2PdfError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::output::{CompilationRequest, CompilationStatus, CompileOutput, CompileStats, StoredPdf};
use crate::pipeline::driver::{EngineDriver, PassOutcome};
use crate::pipeline::log::DiagnosticReport;
use crate::pipeline::sandbox::{self, Sandbox};
use crate::pipeline::{classes, images};
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::progress::Stage;
use crate::reaper::{self, ReapSummary};
use crate::storage::Storage;
use chrono::{Local, Utc};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Name of the rewritten source inside the sandbox.
pub const SOURCE_FILE: &str = "document.tex";
const PDF_FILE: &str = "document.pdf";

/// Engine passes per compilation; the second resolves cross-references.
pub const PASSES: u8 = 2;

/// Compiles LaTeX sources against one storage backend.
///
/// Cheap to share behind an `Arc`; every call gets its own sandbox.
pub struct LatexCompiler {
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn Fetcher>,
    runner: Arc<dyn ProcessRunner>,
    config: CompilerConfig,
}

impl LatexCompiler {
    /// Compiler with the default HTTP fetcher and process runner.
    pub fn new(storage: Arc<dyn Storage>, config: CompilerConfig) -> Result<Self, Tex2PdfError> {
        let fetcher = HttpFetcher::new(config.fetch_timeout_secs)
            .map_err(|e| Tex2PdfError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_collaborators(
            storage,
            Arc::new(fetcher),
            Arc::new(TokioProcessRunner),
            config,
        ))
    }

    /// Compiler with every collaborator supplied by the caller.
    pub fn with_collaborators(
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn Fetcher>,
        runner: Arc<dyn ProcessRunner>,
        config: CompilerConfig,
    ) -> Self {
        Self {
            storage,
            fetcher,
            runner,
            config,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Compile `tex_content` for `project_id` into a PDF.
    ///
    /// # Returns
    /// The relocated artifact (`output_<stamp>_<suffix>.pdf` in the holding
    /// directory), the final-pass diagnostics and stage statistics.
    ///
    /// # Errors
    /// - [`Tex2PdfError::ProvisioningFailed`] before the engine ever runs
    /// - [`Tex2PdfError::ImageFetchFailed`] naming the offending path
    /// - [`Tex2PdfError::CompilationFailed`] with the failing pass's log
    /// - [`Tex2PdfError::ArtifactNotProduced`] after two clean exits
    /// - [`Tex2PdfError::EngineUnavailable`] when the engine cannot start
    pub async fn compile(
        &self,
        tex_content: &str,
        project_id: &str,
    ) -> Result<CompileOutput, Tex2PdfError> {
        if project_id.trim().is_empty() {
            return Err(Tex2PdfError::InvalidInput(
                "project_id must not be empty".into(),
            ));
        }
        if tex_content.trim().is_empty() {
            return Err(Tex2PdfError::InvalidInput(
                "tex_content must not be empty".into(),
            ));
        }

        let total_start = Instant::now();
        let stamp = sandbox::stamp(Local::now());
        info!("Starting compilation {} for project {}", stamp, project_id);

        let mut stats = CompileStats::default();
        let result = match Sandbox::create(&self.config.temp_dir, &stamp).await {
            Ok(sandbox) => {
                let result = self
                    .run_stages(&sandbox, tex_content, project_id, &mut stats)
                    .await;
                sandbox.close();
                result
            }
            Err(e) => Err(e),
        };

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_compile_complete(result.is_ok());
        }

        let (artifact_path, report) = result.inspect_err(|e| {
            error!("Compilation {} failed: {}", stamp, e.message());
        })?;
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        info!(
            "Compiled {} in {}ms ({} passes, {} images, {} class files)",
            artifact_path.display(),
            stats.total_duration_ms,
            stats.passes,
            stats.images_resolved,
            stats.class_files_staged
        );

        Ok(CompileOutput {
            artifact_path,
            report,
            stats,
        })
    }

    /// Compile under `compile_timeout_secs`, persist, then reap in the
    /// background.
    pub async fn compile_and_store(
        &self,
        request: &CompilationRequest,
    ) -> Result<StoredPdf, Tex2PdfError> {
        if request.output_filename.trim().is_empty() {
            return Err(Tex2PdfError::InvalidInput(
                "output_filename must not be empty".into(),
            ));
        }

        let secs = self.config.compile_timeout_secs;
        let output = tokio::time::timeout(
            Duration::from_secs(secs),
            self.compile(&request.tex_content, &request.project_id),
        )
        .await
        .map_err(|_| {
            error!("Compilation for project {} timed out after {}s", request.project_id, secs);
            Tex2PdfError::Timeout { secs }
        })??;

        let stored = self
            .storage
            .save_pdf(
                &output.artifact_path,
                &request.project_id,
                &request.output_filename,
            )
            .await?;
        info!("Saved {} to {} storage", stored.path, self.storage.kind());

        self.spawn_reaper();

        Ok(StoredPdf {
            file_path: stored.path,
            url: stored.url,
            storage: self.storage.kind(),
            compiled_at: Utc::now().to_rfc3339(),
            report: output.report,
            stats: output.stats,
        })
    }

    /// Whether `<project_id>/<filename>` has been published, and where.
    pub async fn compilation_status(
        &self,
        project_id: &str,
        filename: &str,
    ) -> Result<CompilationStatus, Tex2PdfError> {
        let exists = self.storage.pdf_exists(project_id, filename).await?;
        let url = if exists {
            Some(self.storage.pdf_url(project_id, filename).await?)
        } else {
            None
        };
        Ok(CompilationStatus {
            exists,
            file_path: format!("{project_id}/{filename}"),
            url,
            storage: self.storage.kind(),
        })
    }

    /// Sweep the holding directory for artifacts older than `max_age_hours`.
    pub async fn reap_stale_outputs(&self, max_age_hours: u64) -> ReapSummary {
        reaper::reap_stale_outputs(
            self.config.output_dir(),
            reaper::hours(max_age_hours),
        )
        .await
    }

    /// Run the reaper with the configured threshold on a background task.
    pub fn spawn_reaper(&self) -> tokio::task::JoinHandle<ReapSummary> {
        let dir = self.config.output_dir().to_path_buf();
        let max_age = reaper::hours(self.config.max_output_age_hours);
        tokio::spawn(async move { reaper::reap_stale_outputs(&dir, max_age).await })
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    async fn run_stages(
        &self,
        sandbox: &Sandbox,
        tex_content: &str,
        project_id: &str,
        stats: &mut CompileStats,
    ) -> Result<(PathBuf, DiagnosticReport), Tex2PdfError> {
        let dir = sandbox.path();

        // ── Step 1: Class files ──────────────────────────────────────────
        stats.class_files_staged = self
            .stage(
                Stage::ClassFiles,
                classes::provision_class_files(
                    dir,
                    project_id,
                    self.storage.as_ref(),
                    self.fetcher.as_ref(),
                    self.runner.as_ref(),
                    &self.config,
                ),
            )
            .await?;

        // ── Step 2: Images ───────────────────────────────────────────────
        let resolved = self
            .stage(
                Stage::Images,
                images::resolve_images(
                    tex_content,
                    dir,
                    project_id,
                    self.storage.as_ref(),
                    self.fetcher.as_ref(),
                ),
            )
            .await?;
        stats.images_resolved = resolved.fetched;

        // ── Step 3: Source ───────────────────────────────────────────────
        let source_path = dir.join(SOURCE_FILE);
        self.stage(
            Stage::WriteSource,
            tokio::fs::write(&source_path, resolved.text.as_bytes()),
        )
        .await
        .map_err(|e| Tex2PdfError::io(format!("Failed to write {SOURCE_FILE}"), e))?;

        // ── Step 4: Engine passes ────────────────────────────────────────
        let driver = EngineDriver::new(
            self.runner.as_ref(),
            &self.config.engine,
            &self.config.texmf_home,
        );
        let mut report = DiagnosticReport::NoLog;
        for pass in 1..=PASSES {
            debug!("Running {} pass {}/{}", self.config.engine, pass, PASSES);
            let pass_start = Instant::now();
            let outcome = self
                .stage(Stage::Pass(pass), driver.run_pass(dir, SOURCE_FILE))
                .await;
            stats.engine_duration_ms += pass_start.elapsed().as_millis() as u64;
            stats.passes = pass;

            match outcome {
                PassOutcome::Succeeded(r) => report = r,
                PassOutcome::Failed(r) => {
                    return Err(Tex2PdfError::CompilationFailed { pass, report: r });
                }
                PassOutcome::LaunchFailed(r) => {
                    return Err(Tex2PdfError::EngineUnavailable {
                        engine: self.config.engine.clone(),
                        report: r,
                    });
                }
            }
        }

        // ── Step 5: Verify artifact ──────────────────────────────────────
        let pdf_path = dir.join(PDF_FILE);
        if !tokio::fs::try_exists(&pdf_path).await.unwrap_or(false) {
            return Err(Tex2PdfError::ArtifactNotProduced {
                report: DiagnosticReport::Raw(
                    "No PDF output file found after compilation".into(),
                ),
            });
        }

        // ── Step 6: Relocate ─────────────────────────────────────────────
        let output_dir = self.config.output_dir();
        let target = output_dir.join(reaper::artifact_name(&sandbox.id()));
        self.stage(Stage::Relocate, relocate(&pdf_path, output_dir, &target))
            .await?;

        Ok((target, report))
    }

    /// Await `fut` between start/complete progress events.
    async fn stage<T>(&self, stage: Stage, fut: impl Future<Output = T>) -> T {
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_stage_start(stage);
        }
        let start = Instant::now();
        let out = fut.await;
        if let Some(cb) = cb {
            cb.on_stage_complete(stage, start.elapsed().as_millis() as u64);
        }
        out
    }
}

/// Move `from` to `to`, copying when a rename crosses filesystems.
async fn relocate(from: &Path, output_dir: &Path, to: &Path) -> Result<(), Tex2PdfError> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| Tex2PdfError::io(format!("Failed to create {}", output_dir.display()), e))?;

    if let Err(rename_err) = tokio::fs::rename(from, to).await {
        debug!("rename failed ({}), falling back to copy", rename_err);
        tokio::fs::copy(from, to)
            .await
            .map_err(|e| Tex2PdfError::io(format!("Failed to move PDF to {}", to.display()), e))?;
        if let Err(e) = tokio::fs::remove_file(from).await {
            warn!("Could not remove {} after copy: {}", from.display(), e);
        }
    }
    debug!("PDF moved to {}", to.display());
    Ok(())
}

/// Synchronous wrapper around [`LatexCompiler::compile`].
///
/// Creates a temporary tokio runtime internally; do not call from inside
/// an async context.
pub fn compile_sync(
    compiler: &LatexCompiler,
    tex_content: &str,
    project_id: &str,
) -> Result<CompileOutput, Tex2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Tex2PdfError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(compiler.compile(tex_content, project_id))
}
