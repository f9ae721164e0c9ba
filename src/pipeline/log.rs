//! Log scraping: turn a raw `pdflatex` log into a [`DiagnosticReport`].
//!
//! TeX logs are long, noisy and mostly irrelevant to the author. Two
//! patterns carry nearly all actionable information:
//!
//! - **Errors** start with `!` and end at the `l.<line>` marker that points
//!   back into the source. The span in between may cover several lines
//!   (the offending context is echoed), so the pattern runs in dot-all mode.
//! - **Warnings** are single lines containing `Warning:` (LaTeX, package and
//!   font warnings all share the token).
//!
//! Parsing never fails: an absent log and an unreadable log each map to a
//! sentinel report so callers always have something to attach to an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::error;

static RE_ERROR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)!(.*?)l\.\d+").unwrap());
static RE_WARNING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)Warning:(.*?)$").unwrap());

const HEADER: &str = "=== LaTeX Compilation Log ===";

/// Structured diagnostics extracted from a compiler log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticReport {
    /// The log was read and scanned.
    Parsed {
        errors: Vec<String>,
        warnings: Vec<String>,
    },
    /// No log file was written (the engine never started, or crashed early).
    NoLog,
    /// The log exists but could not be read.
    ParseError,
    /// Free-form text, e.g. the error from launching the engine.
    Raw(String),
}

impl DiagnosticReport {
    pub fn errors(&self) -> &[String] {
        match self {
            DiagnosticReport::Parsed { errors, .. } => errors,
            _ => &[],
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            DiagnosticReport::Parsed { warnings, .. } => warnings,
            _ => &[],
        }
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticReport::Parsed { errors, warnings } => {
                writeln!(f, "{HEADER}")?;
                if !errors.is_empty() {
                    write!(f, "\nErrors:\n")?;
                    for e in errors {
                        writeln!(f, "- {e}")?;
                    }
                }
                if !warnings.is_empty() {
                    write!(f, "\nWarnings:\n")?;
                    for w in warnings {
                        writeln!(f, "- {w}")?;
                    }
                }
                Ok(())
            }
            DiagnosticReport::NoLog => f.write_str("No log file found"),
            DiagnosticReport::ParseError => f.write_str("Error parsing log file"),
            DiagnosticReport::Raw(text) => f.write_str(text),
        }
    }
}

/// Extract errors and warnings from log text.
pub fn parse_log(content: &str) -> DiagnosticReport {
    let errors = RE_ERROR
        .captures_iter(content)
        .map(|c| c[1].trim().to_string())
        .collect();
    let warnings = RE_WARNING
        .captures_iter(content)
        .map(|c| c[1].trim().to_string())
        .collect();

    DiagnosticReport::Parsed { errors, warnings }
}

/// Read a log file from disk and parse it.
///
/// Invalid UTF-8 (TeX happily logs Latin-1 file names) is replaced rather
/// than rejected.
pub async fn read_log(log_path: &Path) -> DiagnosticReport {
    match tokio::fs::read(log_path).await {
        Ok(bytes) => parse_log(&String::from_utf8_lossy(&bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => DiagnosticReport::NoLog,
        Err(e) => {
            error!("Error parsing LaTeX log {}: {}", log_path.display(), e);
            DiagnosticReport::ParseError
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LOG: &str = "\
This is pdfTeX, Version 3.141592653-2.6-1.40.25 (TeX Live 2023) (preloaded format=pdflatex)
LaTeX Warning: Citation `knuth84' on page 1 undefined on input line 12.
! Undefined control sequence.
l.14 \\foo

Package hyperref Warning: Token not allowed in a PDF string (Unicode):
! Missing $ inserted.
<inserted text>
                $
l.20 a_b
LaTeX Font Warning:   Font shape `OT1/cmr/bx/sc' undefined
Output written on document.pdf (1 page, 12345 bytes).
";

    #[test]
    fn two_errors_three_warnings() {
        let report = parse_log(SAMPLE_LOG);
        assert_eq!(report.errors().len(), 2, "{report:?}");
        assert_eq!(report.warnings().len(), 3, "{report:?}");

        assert_eq!(report.errors()[0], "Undefined control sequence.");
        assert!(report.errors()[1].starts_with("Missing $ inserted."));
        assert!(report.errors()[1].ends_with('$'), "multi-line span kept: {:?}", report.errors()[1]);

        assert_eq!(
            report.warnings()[0],
            "Citation `knuth84' on page 1 undefined on input line 12."
        );
        assert_eq!(
            report.warnings()[2],
            "Font shape `OT1/cmr/bx/sc' undefined"
        );
        for item in report.errors().iter().chain(report.warnings()) {
            assert_eq!(item, item.trim());
        }
    }

    #[test]
    fn render_has_both_sections() {
        let text = parse_log(SAMPLE_LOG).to_string();
        assert!(text.starts_with("=== LaTeX Compilation Log ===\n"));
        assert!(text.contains("\nErrors:\n- Undefined control sequence.\n"));
        assert!(text.contains("\nWarnings:\n- Citation"));
        assert!(text.find("Errors:").unwrap() < text.find("Warnings:").unwrap());
    }

    #[test]
    fn clean_log_renders_header_only() {
        let report = parse_log("Output written on document.pdf (1 page).\n");
        assert_eq!(report.to_string(), "=== LaTeX Compilation Log ===\n");
    }

    #[test]
    fn warnings_only_omits_error_section() {
        let text = parse_log("LaTeX Warning: There were undefined references.\n").to_string();
        assert!(!text.contains("Errors:"));
        assert!(text.contains("- There were undefined references."));
    }

    #[test]
    fn crlf_log_is_trimmed() {
        let report = parse_log("LaTeX Warning: Label(s) may have changed.\r\n");
        assert_eq!(report.warnings(), ["Label(s) may have changed."]);
    }

    #[test]
    fn file_line_error_lines_are_not_matched() {
        // `-file-line-error` replaces the leading `!` with `file:line:`.
        let log = "./document.tex:3: Undefined control sequence.\nl.3 \\undefinedmacro\n\nLaTeX Warning: Reference `a' undefined.\n";
        let report = parse_log(log);
        assert!(matches!(report, DiagnosticReport::Parsed { .. }));
        assert!(report.errors().is_empty(), "{report:?}");
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn bang_without_line_marker_is_not_an_error() {
        let report = parse_log("! Emergency stop.\n*** (job aborted, no legal \\end found)\n");
        assert!(report.errors().is_empty());
    }

    #[tokio::test]
    async fn missing_log_is_sentinel() {
        let dir = tempfile::TempDir::new().unwrap();
        let report = read_log(&dir.path().join("document.log")).await;
        assert_eq!(report, DiagnosticReport::NoLog);
        assert_eq!(report.to_string(), "No log file found");
    }

    #[tokio::test]
    async fn unreadable_log_is_sentinel() {
        // A directory cannot be read as a file.
        let dir = tempfile::TempDir::new().unwrap();
        let report = read_log(dir.path()).await;
        assert_eq!(report, DiagnosticReport::ParseError);
        assert_eq!(report.to_string(), "Error parsing log file");
    }

    #[tokio::test]
    async fn non_utf8_log_is_parsed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("document.log");
        let mut bytes = b"LaTeX Warning: File `caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b".png' not found.\n");
        tokio::fs::write(&path, bytes).await.unwrap();

        let report = read_log(&path).await;
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn sentinels_serialise_with_kind_tag() {
        let json = serde_json::to_value(DiagnosticReport::NoLog).unwrap();
        assert_eq!(json["kind"], "no_log");
    }
}
