//! CLI binary for edgequake-tex2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `CompilerConfig` and a storage backend, then prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use edgequake_tex2pdf::{
    read_log, CompilationRequest, CompileProgressCallback, CompilerConfig, LatexCompiler,
    LocalStorage, ObjectStorage, ProgressCallback, Stage, Storage, Tex2PdfError,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that logs one line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Compiling");
        bar.set_message("preparing sandbox…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl CompileProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(stage.to_string());
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<12} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_compile_complete(&self, _success: bool) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Compile against a local storage tree (./storage/<project>/...)
  tex2pdf compile paper.tex --project project123 --output paper.pdf

  # Compile against a Supabase bucket
  SUPABASE_URL=https://abc.supabase.co SUPABASE_KEY=... \
    tex2pdf --storage object compile paper.tex --project project123 --output paper.pdf

  # Has a PDF been published?
  tex2pdf status --project project123 paper.pdf

  # Remove relocated PDFs older than 6 hours
  tex2pdf reap --max-age-hours 6

  # Summarise an existing pdflatex log
  tex2pdf parse-log build/document.log

EXIT CODES:
  0  success
  2  invalid input or unresolvable image
  3  class-file provisioning failed
  4  the document does not compile (see the log summary)
  5  environment, storage or timeout failure

ENVIRONMENT VARIABLES:
  TEX2PDF_TEMP_DIR        Parent of every compile sandbox (default /tmp/latex)
  TEX2PDF_TEXMF_HOME      TEXMF tree for class files (default /texmf)
  TEX2PDF_ENGINE          TeX engine binary (default pdflatex)
  TEX2PDF_STORAGE         local | object
  TEX2PDF_STORAGE_DIR     Root of local storage (default ./storage)
  SUPABASE_URL            Object storage project URL
  SUPABASE_KEY            Object storage API key
  TEX2PDF_BUCKET          Object storage bucket (default pdfs)
"#;

/// Compile LaTeX documents with remote images and project class files.
#[derive(Parser, Debug)]
#[command(
    name = "tex2pdf",
    version,
    about = "Compile LaTeX documents with remote images and project class files into PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Storage backend for project resources and published PDFs.
    #[arg(long, global = true, env = "TEX2PDF_STORAGE", value_enum, default_value = "local")]
    storage: StorageArg,

    /// Root directory of local storage.
    #[arg(long, global = true, env = "TEX2PDF_STORAGE_DIR", default_value = "./storage")]
    storage_dir: PathBuf,

    /// Public base URL under which local storage is served.
    #[arg(long, global = true, env = "TEX2PDF_PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// Object storage project URL.
    #[arg(long, global = true, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    /// Object storage API key.
    #[arg(long, global = true, env = "SUPABASE_KEY", hide_env_values = true)]
    supabase_key: Option<String>,

    /// Object storage bucket.
    #[arg(long, global = true, env = "TEX2PDF_BUCKET", default_value = "pdfs")]
    bucket: String,

    /// Parent directory of compile sandboxes.
    #[arg(long, global = true, env = "TEX2PDF_TEMP_DIR", default_value = "/tmp/latex")]
    temp_dir: PathBuf,

    /// Holding directory for relocated PDFs (default: temp dir).
    #[arg(long, global = true, env = "TEX2PDF_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// TEXMF tree receiving project class files.
    #[arg(long, global = true, env = "TEX2PDF_TEXMF_HOME", default_value = "/texmf")]
    texmf_home: PathBuf,

    /// TeX engine binary.
    #[arg(long, global = true, env = "TEX2PDF_ENGINE", default_value = "pdflatex")]
    engine: String,

    /// TEXMF database refresh binary.
    #[arg(long, global = true, env = "TEX2PDF_TEXHASH", default_value = "texhash")]
    texhash: String,

    /// Per-download timeout in seconds.
    #[arg(long, global = true, env = "TEX2PDF_FETCH_TIMEOUT", default_value_t = 120)]
    fetch_timeout: u64,

    /// Whole-compilation timeout in seconds.
    #[arg(long, global = true, env = "TEX2PDF_COMPILE_TIMEOUT", default_value_t = 300)]
    compile_timeout: u64,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "TEX2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TEX2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TEX2PDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a .tex file and publish the PDF to storage.
    Compile {
        /// LaTeX source file.
        input: PathBuf,

        /// Project whose images and class files are used.
        #[arg(long, env = "TEX2PDF_PROJECT")]
        project: String,

        /// File name of the published PDF.
        #[arg(short, long)]
        output: String,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check whether a PDF has been published.
    Status {
        /// Published file name, e.g. paper.pdf.
        filename: String,

        #[arg(long, env = "TEX2PDF_PROJECT")]
        project: String,

        #[arg(long)]
        json: bool,
    },

    /// Delete relocated PDFs older than the threshold.
    Reap {
        #[arg(long, env = "TEX2PDF_MAX_OUTPUT_AGE_HOURS", default_value_t = 24)]
        max_age_hours: u64,
    },

    /// Summarise errors and warnings from a pdflatex log.
    ParseLog {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StorageArg {
    Local,
    Object,
}

impl Command {
    fn json(&self) -> bool {
        match self {
            Command::Compile { json, .. }
            | Command::Status { json, .. }
            | Command::ParseLog { json, .. } => *json,
            Command::Reap { .. } => false,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; keep library INFO
    // logs out of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.command.json();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<Tex2PdfError>()
                .map(|t| t.kind().exit_code())
                .unwrap_or(1);
            eprintln!("{} {:#}", red("✘"), e);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    match &cli.command {
        Command::Compile {
            input,
            project,
            output,
            json,
        } => {
            let tex_content = tokio::fs::read_to_string(input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn CompileProgressCallback>)
            } else {
                None
            };
            let compiler = build_compiler(cli, progress)?;

            let request = CompilationRequest {
                tex_content,
                project_id: project.clone(),
                output_filename: output.clone(),
            };

            match compiler.compile_and_store(&request).await {
                Ok(stored) => {
                    if *json {
                        let body = serde_json::json!({ "success": true, "result": stored });
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&body)
                                .context("Failed to serialise output")?
                        );
                    } else if !cli.quiet {
                        eprintln!(
                            "{}  {} passes  {} images  {}ms  →  {}",
                            green("✔"),
                            stored.stats.passes,
                            stored.stats.images_resolved,
                            stored.stats.total_duration_ms,
                            bold(&stored.url),
                        );
                        let warnings = stored.report.warnings();
                        if !warnings.is_empty() {
                            eprintln!("   {} {} warnings", yellow("⚠"), warnings.len());
                        }
                        println!("{}", stored.file_path);
                    }
                    Ok(())
                }
                Err(e) => {
                    if *json {
                        let body = serde_json::json!({
                            "success": false,
                            "error": e.message(),
                            "kind": e.kind(),
                            "log": e.report(),
                        });
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&body)
                                .context("Failed to serialise output")?
                        );
                    } else if !cli.quiet {
                        eprintln!("{}", e.report());
                    }
                    Err(e).context("Compilation failed")
                }
            }
        }

        Command::Status {
            filename,
            project,
            json,
        } => {
            let compiler = build_compiler(cli, None)?;
            let status = compiler
                .compilation_status(project, filename)
                .await
                .context("Status lookup failed")?;
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status).context("Failed to serialise status")?
                );
            } else if let Some(ref url) = status.url {
                println!("{} {}  {}", green("✔"), status.file_path, dim(url));
            } else {
                println!("{} {}  {}", red("✘"), status.file_path, dim("not compiled"));
            }
            Ok(())
        }

        Command::Reap { max_age_hours } => {
            let config = build_config(cli, None)?;
            let summary = edgequake_tex2pdf::reap_stale_outputs(
                config.output_dir(),
                edgequake_tex2pdf::reaper::hours(*max_age_hours),
            )
            .await;
            if !cli.quiet {
                eprintln!(
                    "Removed {}/{} outputs from {}{}",
                    summary.deleted,
                    summary.scanned,
                    config.output_dir().display(),
                    if summary.failed > 0 {
                        red(&format!("  ({} failed)", summary.failed))
                    } else {
                        String::new()
                    }
                );
            }
            Ok(())
        }

        Command::ParseLog { file, json } => {
            if !tokio::fs::try_exists(file).await.unwrap_or(false) {
                anyhow::bail!("Log file not found: {}", file.display());
            }
            let report = read_log(file).await;
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else {
                println!("{report}");
            }
            Ok(())
        }
    }
}

/// Map CLI args to `CompilerConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<CompilerConfig> {
    let mut builder = CompilerConfig::builder()
        .temp_dir(&cli.temp_dir)
        .texmf_home(&cli.texmf_home)
        .engine(&cli.engine)
        .texhash(&cli.texhash)
        .fetch_timeout_secs(cli.fetch_timeout)
        .compile_timeout_secs(cli.compile_timeout);

    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Pick the storage backend and assemble the compiler.
fn build_compiler(cli: &Cli, progress: Option<ProgressCallback>) -> Result<LatexCompiler> {
    let config = build_config(cli, progress)?;

    let storage: Arc<dyn Storage> = match cli.storage {
        StorageArg::Local => {
            let mut local = LocalStorage::new(&cli.storage_dir);
            if let Some(ref url) = cli.public_base_url {
                local = local.with_public_base_url(url);
            }
            Arc::new(local)
        }
        StorageArg::Object => {
            let url = cli
                .supabase_url
                .as_deref()
                .context("--supabase-url / SUPABASE_URL is required for object storage")?;
            let key = cli
                .supabase_key
                .as_deref()
                .context("--supabase-key / SUPABASE_KEY is required for object storage")?;
            Arc::new(
                ObjectStorage::new(url, key, &cli.bucket, cli.fetch_timeout)
                    .context("Failed to initialise object storage")?,
            )
        }
    };

    LatexCompiler::new(storage, config).context("Failed to initialise compiler")
}
