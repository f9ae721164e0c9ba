//! Error types for the edgequake-tex2pdf library.
//!
//! Three error types map onto the three places a compilation can break:
//!
//! * [`Tex2PdfError`] — **Fatal**: the compilation cannot produce a PDF.
//!   Every pipeline stage returns it and the orchestrator hands it back to
//!   the caller as the single failure result of
//!   [`crate::compile::LatexCompiler::compile`].
//!
//! * [`StorageError`] — a [`crate::storage::Storage`] backend failed
//!   (missing project directory, bucket API error).
//!
//! * [`FetchError`] — a [`crate::fetch::Fetcher`] could not download a URL.
//!
//! Collaborator errors are wrapped into [`Tex2PdfError`] at the stage that
//! observed them, so the caller always sees *which* image or class file
//! broke the build rather than a bare transport error.
//!
//! [`Tex2PdfError::kind`] folds every variant into a [`FailureKind`] so a
//! host (HTTP route, CLI) can map failures to a status without matching on
//! every variant.

use crate::pipeline::log::DiagnosticReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-tex2pdf library.
#[derive(Debug, Error)]
pub enum Tex2PdfError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// An image referenced by the source could not be resolved or fetched.
    ///
    /// A single bad reference fails the whole compilation.
    #[error("Failed to process image {path}: {reason}")]
    ImageFetchFailed { path: String, reason: String },

    /// The request itself is unusable (empty project id, empty source).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ── Provisioning errors ───────────────────────────────────────────────
    /// A project class file could not be listed, fetched or written.
    #[error("Failed to provision class file '{file}': {reason}")]
    ProvisioningFailed { file: String, reason: String },

    // ── Compiler errors ───────────────────────────────────────────────────
    /// The engine exited non-zero on the given pass.
    #[error("LaTeX compilation failed on pass {pass}")]
    CompilationFailed { pass: u8, report: DiagnosticReport },

    /// Both passes exited zero but no PDF was written.
    #[error("PDF was not generated")]
    ArtifactNotProduced { report: DiagnosticReport },

    // ── Infrastructure errors ─────────────────────────────────────────────
    /// The engine binary could not be launched (missing, not executable).
    #[error("Could not run '{engine}'\nIs a TeX distribution installed and on PATH?")]
    EngineUnavailable {
        engine: String,
        report: DiagnosticReport,
    },

    /// Local filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Storage backend failed while persisting or looking up a PDF.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The whole compilation exceeded the configured deadline.
    #[error("Compilation timed out after {secs}s\nIncrease --compile-timeout.")]
    Timeout { secs: u64 },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`Tex2PdfError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bad input; fixable by the author of the request.
    Validation,
    /// Class-file staging failed before the engine ran.
    Provisioning,
    /// The document itself does not compile; see the diagnostic report.
    Compiler,
    /// Environment, filesystem, network or storage failure.
    Infrastructure,
}

impl FailureKind {
    /// Process exit code used by the `tex2pdf` binary.
    pub fn exit_code(self) -> i32 {
        match self {
            FailureKind::Validation => 2,
            FailureKind::Provisioning => 3,
            FailureKind::Compiler => 4,
            FailureKind::Infrastructure => 5,
        }
    }
}

impl Tex2PdfError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Tex2PdfError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Tex2PdfError::ImageFetchFailed { .. } | Tex2PdfError::InvalidInput(_) => {
                FailureKind::Validation
            }
            Tex2PdfError::ProvisioningFailed { .. } => FailureKind::Provisioning,
            Tex2PdfError::CompilationFailed { .. } | Tex2PdfError::ArtifactNotProduced { .. } => {
                FailureKind::Compiler
            }
            Tex2PdfError::EngineUnavailable { .. }
            | Tex2PdfError::Io { .. }
            | Tex2PdfError::Storage(_)
            | Tex2PdfError::Timeout { .. }
            | Tex2PdfError::InvalidConfig(_)
            | Tex2PdfError::Internal(_) => FailureKind::Infrastructure,
        }
    }

    /// Short, single-line message suitable for an API response.
    pub fn message(&self) -> String {
        self.to_string()
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Diagnostic report attached to compiler failures.
    ///
    /// Infrastructure failures without compiler output carry the raw error
    /// text instead, so callers always have something to show.
    pub fn report(&self) -> DiagnosticReport {
        match self {
            Tex2PdfError::CompilationFailed { report, .. }
            | Tex2PdfError::ArtifactNotProduced { report }
            | Tex2PdfError::EngineUnavailable { report, .. } => report.clone(),
            other => DiagnosticReport::Raw(other.to_string()),
        }
    }
}

/// Errors raised by [`crate::storage::Storage`] implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Path escapes the storage root or is otherwise unusable.
    #[error("Invalid storage path '{path}'")]
    InvalidPath { path: String },

    /// The requested object does not exist.
    #[error("Object not found: '{path}'")]
    NotFound { path: String },

    /// Local filesystem access failed.
    #[error("Storage I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The object-storage API answered with a non-success status.
    #[error("Storage API returned HTTP {status} for '{path}': {body}")]
    Api {
        path: String,
        status: u16,
        body: String,
    },

    /// The object-storage API could not be reached or answered garbage.
    #[error("Storage request failed for '{path}': {reason}")]
    Transport { path: String, reason: String },
}

/// Errors raised by [`crate::fetch::Fetcher`] implementations.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} from '{url}'")]
    Status { url: String, status: u16 },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    Timeout { url: String, secs: u64 },

    /// Connection, TLS, body or local-file failure.
    #[error("Failed to download '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// The URL is not absolute or uses a scheme the fetcher cannot serve.
    #[error("Unsupported URL '{url}'")]
    UnsupportedUrl { url: String },
}
