//! CLI binary for pdfbatch.
//!
//! `serve` runs the HTTP service; `run` drives upload → convert → merge →
//! package over local files and prints where the package ended up.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdfbatch::{
    Pipeline, PipelineConfig, PipelineConfigBuilder, ProgressCallback, StageProgressCallback,
    TaskRegistry, UploadFile,
};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar over the convert stage, one log line per document.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn item_elapsed(&self) -> String {
        let elapsed = self
            .started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{elapsed:.1}s"))
    }
}

impl StageProgressCallback for CliProgressCallback {
    fn on_convert_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} documents  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} documents"))
        ));
    }

    fn on_item_start(&self, _index: usize, _total: usize, item: &str) {
        if let Ok(mut t) = self.started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(item.to_string());
    }

    fn on_item_complete(&self, index: usize, total: usize, item: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            item,
            self.item_elapsed()
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, item: &str, reason: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let reason = if reason.chars().count() > 80 {
            format!("{}\u{2026}", reason.chars().take(79).collect::<String>())
        } else {
            reason.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            item,
            red(&reason),
            self.item_elapsed()
        ));
        self.bar.inc(1);
    }

    fn on_convert_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} documents converted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on port 5000 with storage under ./data
  pdfbatch serve --storage-root data

  # Convert, merge and package local documents in one go
  pdfbatch run certificates/*.docx --package-name batch-7.zip

  # Machine-readable summary
  pdfbatch run a.docx b.docx --json

ENVIRONMENT VARIABLES:
  PDFBATCH_STORAGE_ROOT   Root of uploads/, pdfs/, merged/, complete/
  PDFBATCH_SOFFICE        LibreOffice executable (default: soffice)
  PDFBATCH_PDFIUM_LIB     pdfium shared library or its directory
  PDFBATCH_HOST           Bind address for `serve`
  PDFBATCH_PORT           Port for `serve`
  RUST_LOG                Overrides the log filter

SETUP:
  LibreOffice must be installed (`soffice` on PATH or PDFBATCH_SOFFICE).
  Merging needs libpdfium; without PDFBATCH_PDFIUM_LIB the system library
  path is searched.
"#;

/// Batch DOCX-to-PDF conversion with per-task progress.
#[derive(Parser, Debug)]
#[command(name = "pdfbatch", version, about, after_help = AFTER_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug-level logging.
    #[arg(short, long, global = true, env = "PDFBATCH_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true, env = "PDFBATCH_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Upload, convert, merge and package local files.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Directory holding uploads/, pdfs/, merged/ and complete/.
    #[arg(long, env = "PDFBATCH_STORAGE_ROOT", default_value = ".")]
    storage_root: PathBuf,

    /// LibreOffice executable.
    #[arg(long, env = "PDFBATCH_SOFFICE", default_value = "soffice")]
    soffice: PathBuf,

    /// pdfium shared library, or the directory containing it.
    #[arg(long, env = "PDFBATCH_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Extension of the documents to convert.
    #[arg(long, env = "PDFBATCH_EXTENSION", default_value = "docx")]
    extension: String,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    engines: EngineArgs,

    #[arg(long, env = "PDFBATCH_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    #[arg(short, long, env = "PDFBATCH_PORT", default_value_t = 5000)]
    port: u16,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    engines: EngineArgs,

    /// Documents to process.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Package file name (default: certificates_<task id>.zip).
    #[arg(long)]
    package_name: Option<String>,

    /// Print the final task progress as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDFBATCH_NO_PROGRESS")]
    no_progress: bool,
}

impl EngineArgs {
    fn config_builder(&self) -> PipelineConfigBuilder {
        let mut builder = PipelineConfig::builder()
            .storage_root(&self.storage_root)
            .soffice_path(&self.soffice)
            .source_extension(&self.extension);
        if let Some(lib) = &self.pdfium_lib {
            builder = builder.pdfium_lib_path(lib);
        }
        builder
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The progress bar is the feedback for `run`; keep library logs quiet
    // under it unless asked for.
    let show_progress = matches!(&cli.command, Command::Run(args) if !args.no_progress && !args.json)
        && !cli.quiet;
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

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Run(args) => run(args, show_progress, cli.quiet).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = args
        .engines
        .config_builder()
        .build()
        .context("Invalid configuration")?;
    let pipeline = Pipeline::with_default_engines(config, Arc::new(TaskRegistry::new()))
        .context("Failed to prepare storage directories")?;

    let addr = SocketAddr::new(args.host, args.port);
    pdfbatch::server::serve(addr, Arc::new(pipeline))
        .await
        .with_context(|| format!("HTTP server on {addr} failed"))
}

async fn run(args: RunArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let mut builder = args.engines.config_builder();
    if show_progress {
        builder = builder.progress_callback(CliProgressCallback::new() as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;
    let pipeline = Pipeline::with_default_engines(config, Arc::new(TaskRegistry::new()))
        .context("Failed to prepare storage directories")?;

    let files = args
        .files
        .iter()
        .map(|path| UploadFile::from_path(path))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read input files")?;
    let package_name = args.package_name.clone();

    // Every stage blocks on LibreOffice/pdfium; keep them off the runtime.
    let (progress, package) = tokio::task::spawn_blocking(move || -> Result<_> {
        let upload = pipeline.upload(files).context("Upload failed")?;
        let task_id = upload.task_id;
        pipeline.convert(&task_id).context("Conversion failed")?;
        pipeline.merge(&task_id).context("Merge failed")?;
        let package = pipeline
            .package(&task_id, package_name.as_deref())
            .context("Packaging failed")?;
        let progress = pipeline.progress(&task_id)?;
        Ok((progress, package))
    })
    .await
    .context("Pipeline task panicked")??;

    if args.json {
        let json =
            serde_json::to_string_pretty(&progress).context("Failed to serialise progress")?;
        println!("{json}");
    } else if !quiet {
        let failed = progress.total.saturating_sub(progress.success_count());
        eprintln!(
            "{}  {}/{} converted  {}  →  {}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            progress.success_count(),
            progress.total,
            dim(&format!("{} files packaged", package.file_count)),
            bold(&package.archive_path.display().to_string()),
        );
    }
    Ok(())
}
