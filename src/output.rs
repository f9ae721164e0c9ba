//! Request and result types for a compilation.

use crate::pipeline::log::DiagnosticReport;
use crate::storage::StorageKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One publish request: compile `tex_content` and store it as
/// `<project_id>/<output_filename>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationRequest {
    pub tex_content: String,
    pub project_id: String,
    pub output_filename: String,
}

/// Result of [`crate::compile::LatexCompiler::compile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOutput {
    /// `output_<stamp>_<suffix>.pdf` in the holding directory. The caller owns it;
    /// the reaper removes it once it is old enough.
    pub artifact_path: PathBuf,

    /// Diagnostics from the final pass. Warnings survive a successful build.
    pub report: DiagnosticReport,

    pub stats: CompileStats,
}

/// Counters and timings for one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileStats {
    pub class_files_staged: usize,
    /// Distinct images downloaded into the sandbox.
    pub images_resolved: usize,
    /// Engine passes actually run (1 when the first pass fails).
    pub passes: u8,
    pub total_duration_ms: u64,
    /// Time spent inside the engine, summed over passes.
    pub engine_duration_ms: u64,
}

/// Result of [`crate::compile::LatexCompiler::compile_and_store`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPdf {
    /// Storage-relative path, `<project_id>/<filename>`.
    pub file_path: String,
    pub url: String,
    pub storage: StorageKind,
    /// RFC 3339 completion time.
    pub compiled_at: String,
    pub report: DiagnosticReport,
    pub stats: CompileStats,
}

/// Answer to "has this PDF been compiled yet?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationStatus {
    pub exists: bool,
    pub file_path: String,
    /// Present only when the PDF exists.
    pub url: Option<String>,
    pub storage: StorageKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_deserialises_from_api_body() {
        let req: CompilationRequest = serde_json::from_str(
            r#"{"tex_content": "\\documentclass{article}", "project_id": "p1", "output_filename": "paper.pdf"}"#,
        )
        .unwrap();
        assert_eq!(req.project_id, "p1");
        assert_eq!(req.output_filename, "paper.pdf");
    }

    #[test]
    fn stored_pdf_serialises_storage_kind() {
        let stored = StoredPdf {
            file_path: "p1/paper.pdf".into(),
            url: "/storage/p1/paper.pdf".into(),
            storage: StorageKind::Local,
            compiled_at: "2024-01-01T00:00:00+00:00".into(),
            report: DiagnosticReport::Parsed {
                errors: vec![],
                warnings: vec![],
            },
            stats: CompileStats::default(),
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["file_path"], "p1/paper.pdf");
        assert!(json["storage"].is_string());
    }
}
