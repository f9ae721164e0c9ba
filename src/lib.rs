//! # edgequake-tex2pdf
//!
//! Compile LaTeX documents that reference remote images and project class
//! files into PDF.
//!
//! ## Why this crate?
//!
//! A document authored in a web editor rarely compiles as-is: its figures
//! live in object storage or behind URLs, its custom `.cls` files live in
//! the project bucket, and the engine must never share a working directory
//! with another request. This crate gathers everything a document needs
//! into a private sandbox, runs the engine twice so cross-references
//! resolve, scrapes the log into a structured report and hands back the PDF.
//! The sandbox is gone when the call returns, whatever happened.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .tex source
//!  │
//!  ├─ 1. Sandbox  private compile_<stamp>_* directory under temp_dir
//!  ├─ 2. Classes  project .cls files → sandbox + TEXMFHOME, texhash
//!  ├─ 3. Images   \includegraphics targets fetched concurrently, rewritten
//!  ├─ 4. Engine   pdflatex -interaction=nonstopmode, two passes
//!  ├─ 5. Log      errors / warnings scraped into a DiagnosticReport
//!  └─ 6. Output   output_<stamp>.pdf relocated; sandbox removed
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_tex2pdf::{CompilerConfig, LatexCompiler, LocalStorage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(LocalStorage::new("./storage"));
//!     let compiler = LatexCompiler::new(storage, CompilerConfig::default())?;
//!     let source = r"\documentclass{article}\begin{document}Hi\end{document}";
//!     let output = compiler.compile(source, "project123").await?;
//!     println!("{}", output.artifact_path.display());
//!     eprintln!("{}", output.report);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tex2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `test-export-mocks` | off | Exports mockall `Mock*` collaborators for downstream tests |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-tex2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compile;
pub mod config;
pub mod error;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod reaper;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compile::{compile_sync, LatexCompiler};
pub use config::{CompilerConfig, CompilerConfigBuilder};
pub use error::{FailureKind, FetchError, StorageError, Tex2PdfError};
pub use fetch::{Fetcher, HttpFetcher};
pub use output::{CompilationRequest, CompilationStatus, CompileOutput, CompileStats, StoredPdf};
pub use pipeline::log::{parse_log, read_log, DiagnosticReport};
pub use process::{ProcessOutput, ProcessRequest, ProcessRunner, TokioProcessRunner};
pub use progress::{CompileProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use reaper::{reap_stale_outputs, ReapSummary};
pub use storage::{LocalStorage, ObjectStorage, ProjectResource, Storage, StorageKind, StoredObject};
