//! Configuration for the LaTeX compiler.
//!
//! All compilation behaviour is controlled through [`CompilerConfig`], built
//! via its [`CompilerConfigBuilder`]. Settings a TeX service usually reads
//! from process-wide environment variables (`TEXMFHOME`, temp dir,
//! timeouts) are explicit fields here and are threaded into each stage, so
//! two compilers with different settings can run side by side.

use crate::error::Tex2PdfError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::{Path, PathBuf};

/// Configuration for [`crate::compile::LatexCompiler`].
///
/// # Example
/// ```rust
/// use edgequake_tex2pdf::CompilerConfig;
///
/// let config = CompilerConfig::builder()
///     .temp_dir("/var/tmp/latex")
///     .texmf_home("/srv/texmf")
///     .compile_timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.output_dir(), std::path::Path::new("/var/tmp/latex"));
/// ```
#[derive(Clone)]
pub struct CompilerConfig {
    /// Parent of every sandbox. Default: `/tmp/latex`.
    pub temp_dir: PathBuf,

    /// Holding area for relocated PDFs. Default: same as `temp_dir`.
    pub output_dir: Option<PathBuf>,

    /// Personal TEXMF tree that receives project class files.
    ///
    /// Class files land in `<texmf_home>/tex/latex`, the engine sees it as
    /// `TEXMFHOME`, and `texhash` refreshes it. Default: `/texmf`.
    ///
    /// Shared by every compilation using this config; concurrent
    /// compilations for different projects race on it.
    pub texmf_home: PathBuf,

    /// TeX engine binary. Default: `pdflatex`.
    pub engine: String,

    /// File-database refresh binary. Default: `texhash`.
    pub texhash: String,

    /// Per-download timeout for images and class files. Default: 120.
    pub fetch_timeout_secs: u64,

    /// Wall-clock limit for one `compile_and_store` call. Default: 300.
    pub compile_timeout_secs: u64,

    /// Age after which relocated PDFs are reaped. Default: 24.
    pub max_output_age_hours: u64,

    /// Optional stage observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("/tmp/latex"),
            output_dir: None,
            texmf_home: PathBuf::from("/texmf"),
            engine: "pdflatex".to_string(),
            texhash: "texhash".to_string(),
            fetch_timeout_secs: 120,
            compile_timeout_secs: 300,
            max_output_age_hours: 24,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CompilerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerConfig")
            .field("temp_dir", &self.temp_dir)
            .field("output_dir", &self.output_dir)
            .field("texmf_home", &self.texmf_home)
            .field("engine", &self.engine)
            .field("texhash", &self.texhash)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("compile_timeout_secs", &self.compile_timeout_secs)
            .field("max_output_age_hours", &self.max_output_age_hours)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn CompileProgressCallback>"),
            )
            .finish()
    }
}

impl CompilerConfig {
    /// Create a new builder for `CompilerConfig`.
    pub fn builder() -> CompilerConfigBuilder {
        CompilerConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.temp_dir)
    }

    /// Directory the TeX toolchain searches for class files by name.
    pub fn class_dir(&self) -> PathBuf {
        self.texmf_home.join("tex").join("latex")
    }
}

/// Builder for [`CompilerConfig`].
#[derive(Debug)]
pub struct CompilerConfigBuilder {
    config: CompilerConfig,
}

impl CompilerConfigBuilder {
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn texmf_home(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.texmf_home = dir.into();
        self
    }

    pub fn engine(mut self, bin: impl Into<String>) -> Self {
        self.config.engine = bin.into();
        self
    }

    pub fn texhash(mut self, bin: impl Into<String>) -> Self {
        self.config.texhash = bin.into();
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn compile_timeout_secs(mut self, secs: u64) -> Self {
        self.config.compile_timeout_secs = secs;
        self
    }

    pub fn max_output_age_hours(mut self, hours: u64) -> Self {
        self.config.max_output_age_hours = hours;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CompilerConfig, Tex2PdfError> {
        let c = &self.config;
        if c.engine.trim().is_empty() {
            return Err(Tex2PdfError::InvalidConfig(
                "Engine binary must not be empty".into(),
            ));
        }
        if c.temp_dir.as_os_str().is_empty() {
            return Err(Tex2PdfError::InvalidConfig(
                "Temp directory must not be empty".into(),
            ));
        }
        if c.fetch_timeout_secs == 0 || c.compile_timeout_secs == 0 {
            return Err(Tex2PdfError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_settings() {
        let c = CompilerConfig::default();
        assert_eq!(c.temp_dir, PathBuf::from("/tmp/latex"));
        assert_eq!(c.output_dir(), Path::new("/tmp/latex"));
        assert_eq!(c.class_dir(), PathBuf::from("/texmf/tex/latex"));
        assert_eq!(c.engine, "pdflatex");
        assert_eq!(c.compile_timeout_secs, 300);
        assert_eq!(c.max_output_age_hours, 24);
    }

    #[test]
    fn explicit_output_dir_wins() {
        let c = CompilerConfig::builder()
            .temp_dir("/a")
            .output_dir("/b")
            .build()
            .unwrap();
        assert_eq!(c.output_dir(), Path::new("/b"));
    }

    #[test]
    fn empty_engine_rejected() {
        let err = CompilerConfig::builder().engine(" ").build().unwrap_err();
        assert!(matches!(err, Tex2PdfError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(CompilerConfig::builder()
            .compile_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn debug_hides_callback() {
        let s = format!("{:?}", CompilerConfig::default());
        assert!(s.contains("progress_callback: None"));
    }
}
