//! Pipeline stages for LaTeX-to-PDF compilation.
//!
//! Each submodule implements exactly one step of a compilation. The
//! orchestrator in [`crate::compile`] threads a single [`sandbox::Sandbox`]
//! through them in order.
//!
//! ## Data Flow
//!
//! ```text
//! sandbox ──▶ classes ──▶ images ──▶ driver ×2 ──▶ log
//! (tempdir)   (.cls)      (fetch)    (pdflatex)    (errors/warnings)
//! ```
//!
//! 1. [`sandbox`] — private working directory, removed on every exit path
//! 2. [`classes`] — stage project `.cls` files and refresh the TEXMF database
//! 3. [`images`]  — download `\includegraphics` targets concurrently and
//!    rewrite the references to local files
//! 4. [`driver`]  — one non-interactive engine pass; run twice so
//!    cross-references resolve
//! 5. [`log`]     — scrape the engine log into a [`log::DiagnosticReport`]

pub mod classes;
pub mod driver;
pub mod images;
pub mod log;
pub mod sandbox;
