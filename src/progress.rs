//! Progress-callback trait for per-stage compilation events.
//!
//! Inject an [`Arc<dyn CompileProgressCallback>`] via
//! [`crate::config::CompilerConfigBuilder::progress_callback`] to observe
//! the pipeline as it moves through its stages. The `tex2pdf` binary uses
//! it to drive a terminal spinner; a web host could forward the events to a
//! WebSocket instead.
//!
//! # Example
//!
//! ```rust
//! use edgequake_tex2pdf::{CompileProgressCallback, CompilerConfig, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl CompileProgressCallback for Printer {
//!     fn on_stage_start(&self, stage: Stage) {
//!         eprintln!("→ {stage}");
//!     }
//! }
//!
//! let config = CompilerConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn CompileProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ClassFiles,
    Images,
    WriteSource,
    /// Engine pass, 1-indexed.
    Pass(u8),
    Relocate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ClassFiles => f.write_str("class files"),
            Stage::Images => f.write_str("images"),
            Stage::WriteSource => f.write_str("source"),
            Stage::Pass(n) => write!(f, "pass {n}/{}", crate::compile::PASSES),
            Stage::Relocate => f.write_str("relocate"),
        }
    }
}

/// Called by the compiler as it runs each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`.
pub trait CompileProgressCallback: Send + Sync {
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// # Arguments
    /// * `elapsed_ms` — wall-clock time spent in the stage
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once per compilation, after the sandbox is gone.
    fn on_compile_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl CompileProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CompilerConfig`].
pub type ProgressCallback = Arc<dyn CompileProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_label_tracks_pass_count() {
        let last = crate::compile::PASSES;
        assert_eq!(Stage::Pass(last).to_string(), format!("pass {last}/{last}"));
        assert_eq!(Stage::Pass(1).to_string(), format!("pass 1/{last}"));
    }
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl CompileProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {stage}"));
        }

        fn on_compile_complete(&self, success: bool) {
            self.events.lock().unwrap().push(format!("done {success}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Images);
        cb.on_stage_complete(Stage::Pass(1), 10);
        cb.on_compile_complete(false);
    }

    #[test]
    fn partial_overrides_keep_defaults() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Pass(2));
        rec.on_stage_complete(Stage::Pass(2), 5);
        rec.on_compile_complete(true);
        assert_eq!(*rec.events.lock().unwrap(), ["start pass 2/2", "done true"]);
    }
}
