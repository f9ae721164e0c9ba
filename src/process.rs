//! External process execution behind a mockable trait.
//!
//! The pipeline launches two external tools: the TeX engine and the file
//! database refresher (`texhash`). Both go through [`ProcessRunner`] so the
//! orchestrator can be tested without a TeX installation.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

/// A fully specified child-process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; inherits the parent's when `None`.
    pub working_dir: Option<PathBuf>,
    /// Extra environment for the child only. The parent environment is
    /// never mutated.
    pub env: Vec<(String, String)>,
}

impl ProcessRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a child process to completion and captures its output.
///
/// `Err` means the process could not be started at all; a non-zero exit is
/// an `Ok` with [`ProcessOutput::success`] returning `false`.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, request: &ProcessRequest) -> std::io::Result<ProcessOutput>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
///
/// Children are killed when the awaiting future is dropped, so an outer
/// timeout does not leave a stray `pdflatex` running.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, request: &ProcessRequest) -> std::io::Result<ProcessOutput> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);
        if let Some(ref dir) = request.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_args_and_env() {
        let req = ProcessRequest::new("pdflatex")
            .arg("-interaction=nonstopmode")
            .arg("document.tex")
            .current_dir("/tmp/x")
            .env("TEXMFHOME", "/texmf");
        assert_eq!(req.program, "pdflatex");
        assert_eq!(req.args, ["-interaction=nonstopmode", "document.tex"]);
        assert_eq!(req.working_dir, Some(PathBuf::from("/tmp/x")));
        assert_eq!(req.env, [("TEXMFHOME".to_string(), "/texmf".to_string())]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tokio_runner_captures_output_and_exit_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let req = ProcessRequest::new("sh")
            .arg("-c")
            .arg("pwd; echo \"$PROBE\" >&2; exit 3")
            .current_dir(dir.path())
            .env("PROBE", "child-only");

        let out = TokioProcessRunner.run(&req).await.unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert_eq!(out.stderr.trim(), "child-only");
        assert!(std::env::var("PROBE").is_err());
    }

    #[tokio::test]
    async fn tokio_runner_reports_missing_binary_as_err() {
        let req = ProcessRequest::new("definitely-not-a-real-binary-tex2pdf");
        assert!(TokioProcessRunner.run(&req).await.is_err());
    }
}
