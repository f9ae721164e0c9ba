//! One engine pass over the sandbox source.
//!
//! The engine runs non-interactively with file:line error messages, so a
//! broken document terminates with a non-zero exit and a log instead of
//! waiting on stdin.

use crate::pipeline::log::{read_log, DiagnosticReport};
use crate::process::{ProcessRequest, ProcessRunner};
use std::path::Path;
use tracing::{debug, error};

/// Result of a single engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Exit code 0. The report may still carry warnings.
    Succeeded(DiagnosticReport),
    /// Non-zero exit or killed by a signal.
    Failed(DiagnosticReport),
    /// The engine could not be started.
    LaunchFailed(DiagnosticReport),
}

impl PassOutcome {
    pub fn report(&self) -> &DiagnosticReport {
        match self {
            PassOutcome::Succeeded(r) | PassOutcome::Failed(r) | PassOutcome::LaunchFailed(r) => r,
        }
    }
}

/// Invokes the TeX engine through a [`ProcessRunner`].
pub struct EngineDriver<'a> {
    runner: &'a dyn ProcessRunner,
    engine: &'a str,
    texmf_home: &'a Path,
}

impl<'a> EngineDriver<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, engine: &'a str, texmf_home: &'a Path) -> Self {
        Self {
            runner,
            engine,
            texmf_home,
        }
    }

    /// The exact invocation used for `tex_file` inside `sandbox`.
    pub fn request(&self, sandbox: &Path, tex_file: &str) -> ProcessRequest {
        ProcessRequest::new(self.engine)
            .arg("-interaction=nonstopmode")
            .arg("-file-line-error")
            .arg(tex_file)
            .current_dir(sandbox)
            .env("TEXMFHOME", self.texmf_home.to_string_lossy())
    }

    /// Run one pass and parse `<stem>.log` from the sandbox.
    pub async fn run_pass(&self, sandbox: &Path, tex_file: &str) -> PassOutcome {
        let request = self.request(sandbox, tex_file);
        let output = match self.runner.run(&request).await {
            Ok(out) => out,
            Err(e) => {
                error!("Error running {}: {}", self.engine, e);
                return PassOutcome::LaunchFailed(DiagnosticReport::Raw(format!(
                    "Error running {}: {e}",
                    self.engine
                )));
            }
        };

        debug!("{} stdout:\n{}", self.engine, output.stdout);
        if !output.stderr.is_empty() {
            debug!("{} stderr:\n{}", self.engine, output.stderr);
        }

        let stem = Path::new(tex_file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| tex_file.to_string());
        let report = read_log(&sandbox.join(format!("{stem}.log"))).await;

        if output.success() {
            PassOutcome::Succeeded(report)
        } else {
            debug!("{} exited with {:?}", self.engine, output.exit_code);
            PassOutcome::Failed(report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{MockProcessRunner, ProcessOutput};
    use tempfile::TempDir;

    const LOG: &str = "! Undefined control sequence.\nl.3 \\foo\nLaTeX Warning: Reference `x' undefined.\n";

    #[test]
    fn request_uses_nonstop_flags_and_child_env() {
        let runner = MockProcessRunner::new();
        let driver = EngineDriver::new(&runner, "pdflatex", Path::new("/texmf"));
        let req = driver.request(Path::new("/tmp/latex/compile_x"), "document.tex");
        assert_eq!(req.program, "pdflatex");
        assert_eq!(
            req.args,
            ["-interaction=nonstopmode", "-file-line-error", "document.tex"]
        );
        assert_eq!(
            req.working_dir.as_deref(),
            Some(Path::new("/tmp/latex/compile_x"))
        );
        assert_eq!(req.env, [("TEXMFHOME".to_string(), "/texmf".to_string())]);
    }

    #[tokio::test]
    async fn non_zero_exit_is_failed_with_parsed_log() {
        let sandbox = TempDir::new().unwrap();
        std::fs::write(sandbox.path().join("document.log"), LOG).unwrap();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(|_| {
            Ok(ProcessOutput {
                exit_code: Some(1),
                ..Default::default()
            })
        });

        let driver = EngineDriver::new(&runner, "pdflatex", Path::new("/texmf"));
        let outcome = driver.run_pass(sandbox.path(), "document.tex").await;
        let PassOutcome::Failed(report) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(report.errors(), ["Undefined control sequence."]);
        assert_eq!(report.warnings(), ["Reference `x' undefined."]);
    }

    #[tokio::test]
    async fn zero_exit_without_log_is_success_with_sentinel() {
        let sandbox = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(|_| {
            Ok(ProcessOutput {
                exit_code: Some(0),
                ..Default::default()
            })
        });

        let driver = EngineDriver::new(&runner, "pdflatex", Path::new("/texmf"));
        let outcome = driver.run_pass(sandbox.path(), "document.tex").await;
        assert_eq!(outcome, PassOutcome::Succeeded(DiagnosticReport::NoLog));
    }

    #[tokio::test]
    async fn launch_error_is_reported_not_raised() {
        let sandbox = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(|_| {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory",
            ))
        });

        let driver = EngineDriver::new(&runner, "pdflatex", Path::new("/texmf"));
        let outcome = driver.run_pass(sandbox.path(), "document.tex").await;
        match outcome {
            PassOutcome::LaunchFailed(DiagnosticReport::Raw(text)) => {
                assert!(text.starts_with("Error running pdflatex: "), "{text}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
