//! CLI binary for ocr-jobs.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service and the
//! retention sweeper, `run` recognises a local batch in-process and prints
//! the records as JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ocr_jobs::{
    serve, ImageDescriptor, ImageProcessor, JobProgressCallback, JobStore, JobSubmitter,
    MemoryJobStore, OcrEngine, RetentionSweeper, ServiceConfig, ServiceConfigBuilder,
    TesseractEngine,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders a live progress bar and one log line per image. Images finish
/// out of order, so timings are tracked per index.
struct CliProgressCallback {
    bar: ProgressBar,
    names: Vec<String>,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new(names: Vec<String>) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(names.len() as u64);
        bar.set_style(style);
        bar.set_prefix("Recognising");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            names,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn name(&self, index: usize) -> &str {
        self.names.get(index).map(String::as_str).unwrap_or("?")
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job_id: &str, total_images: usize) {
        self.bar.println(format!(
            "{} {}  {}",
            cyan("◆"),
            bold(&format!("Recognising {total_images} images…")),
            dim(job_id)
        ));
    }

    fn on_image_start(&self, _job_id: &str, index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(self.name(index).to_string());
    }

    fn on_image_complete(&self, _job_id: &str, index: usize, total: usize, word_count: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}  {}",
            green("✓"),
            index + 1,
            total,
            self.name(index),
            dim(&format!("{word_count:>5} words")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, _job_id: &str, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}  {}",
            red("✗"),
            index + 1,
            total,
            self.name(index),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_job_complete(&self, _job_id: &str, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images recognised",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images recognised  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on port 3000
  ocr-jobs serve

  # Custom storage locations and a shorter retention window
  ocr-jobs serve --upload-dir /var/lib/ocr/uploads --retention 3600

  # Recognise local images and print JSON records
  ocr-jobs run scans/*.png

  # German text, two engines at a time, results to a file
  ocr-jobs run --language deu --concurrency 2 -o out.json page1.png page2.png

HTTP ENDPOINTS (serve):
  POST /api/assets        multipart field "userFiles"  → 202 {jobId, images}
  GET  /api/random        random sample-corpus job     → 202 {jobId, images}
  GET  /jobs/:id          per-image records            → 200 | 404
  GET  /jobs/:id/status   aggregate progress           → 200 | 404
  GET  /api/health        liveness                     → 200

ENVIRONMENT VARIABLES:
  Every flag can be set via OCR_JOBS_<FLAG>, e.g. OCR_JOBS_LISTEN=127.0.0.1:8080.
  RUST_LOG overrides the log filter chosen by -v / -q.

SETUP:
  Install tesseract and the language data you need, e.g.
    apt install tesseract-ocr tesseract-ocr-eng
"#;

/// Asynchronous batch OCR with Tesseract.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-jobs",
    version,
    about = "Asynchronous batch OCR service: submit images, poll per-image results",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCR_JOBS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OCR_JOBS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service and the retention sweeper.
    Serve(ServeArgs),
    /// Recognise local images in-process and print the records as JSON.
    Run(RunArgs),
}

/// Engine options shared by both subcommands.
#[derive(Args, Debug)]
struct EngineArgs {
    /// Tesseract language model, e.g. eng, deu, eng+fra.
    #[arg(long, env = "OCR_JOBS_LANGUAGE", default_value = "eng")]
    language: String,

    /// Path to the tesseract binary.
    #[arg(long, env = "OCR_JOBS_TESSERACT", default_value = "tesseract")]
    tesseract_bin: PathBuf,

    /// Images recognised at once across all jobs.
    #[arg(short, long, env = "OCR_JOBS_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-image recognition deadline in seconds.
    #[arg(long, env = "OCR_JOBS_OCR_TIMEOUT", default_value_t = 120)]
    ocr_timeout: u64,

    /// Fail an image when any annotation row is malformed.
    #[arg(long, env = "OCR_JOBS_STRICT")]
    strict: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "OCR_JOBS_LISTEN", default_value = "0.0.0.0:3000")]
    listen: SocketAddr,

    /// Upload storage area (also swept for stale files).
    #[arg(long, env = "OCR_JOBS_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Example corpus for /api/random.
    #[arg(long, env = "OCR_JOBS_SAMPLE_DIR", default_value = "samples")]
    sample_dir: PathBuf,

    /// Files picked per random submission.
    #[arg(long, env = "OCR_JOBS_SAMPLE_COUNT", default_value_t = 10)]
    sample_count: usize,

    /// Delete uploads older than this many seconds.
    #[arg(long, env = "OCR_JOBS_RETENTION", default_value_t = 12 * 60 * 60)]
    retention: u64,

    /// Seconds between retention sweeps.
    #[arg(long, env = "OCR_JOBS_SWEEP_INTERVAL", default_value_t = 10 * 60)]
    sweep_interval: u64,

    /// Evict finished jobs after this many seconds (0 keeps them forever).
    #[arg(long, env = "OCR_JOBS_JOB_TTL", default_value_t = 24 * 60 * 60)]
    job_ttl: u64,

    /// Largest accepted upload body in MiB.
    #[arg(long, env = "OCR_JOBS_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Image files to recognise.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "OCR_JOBS_OUTPUT")]
    output: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "OCR_JOBS_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    engine: EngineArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The progress bar of `run` replaces INFO-level library logs.
    let show_progress = matches!(&cli.command, Command::Run(args) if !args.no_progress) && !cli.quiet;
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
        Command::Serve(args) => run_server(args).await,
        Command::Run(args) => run_batch(args, show_progress, cli.quiet).await,
    }
}

async fn run_server(args: ServeArgs) -> Result<()> {
    let config = engine_builder(&args.engine)
        .listen_addr(args.listen)
        .upload_dir(&args.upload_dir)
        .sample_dir(&args.sample_dir)
        .sample_count(args.sample_count)
        .retention(Duration::from_secs(args.retention))
        .sweep_interval(Duration::from_secs(args.sweep_interval))
        .job_ttl(Duration::from_secs(args.job_ttl))
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024))
        .build()
        .context("Invalid configuration")?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.upload_dir.display()))?;

    let engine = Arc::new(TesseractEngine::new(&config.tesseract_bin));
    // Startup check only: a broken engine still lets the service run and
    // surfaces as per-image errors.
    if let Err(e) = engine.acquire(&config.language).await {
        warn!("Tesseract is not ready: {}", e);
    }

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::with_ttl(config.job_ttl));
    let processor = ImageProcessor::new(store.clone(), engine, &config);
    let submitter = JobSubmitter::new(processor.clone(), &config);
    // One signal stops the server, the sweeper and in-flight recognition.
    let shutdown = processor.shutdown_signal();

    let sweeper = RetentionSweeper::new(&config)
        .with_store(store)
        .spawn(shutdown.clone());

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, shutting down");
                    shutdown.trigger();
                }
                Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
            }
        });
    }

    let served = serve(&config, submitter, shutdown).await;

    processor.shutdown();
    let _ = sweeper.await;

    served.context("HTTP server failed")
}

async fn run_batch(args: RunArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let images: Vec<ImageDescriptor> = args
        .images
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            ImageDescriptor::new(name, path)
        })
        .collect();

    let mut builder = engine_builder(&args.engine);
    if show_progress {
        let names = images.iter().map(|i| i.filename.clone()).collect();
        builder = builder.progress_callback(CliProgressCallback::new(names));
    }
    let config = builder.build().context("Invalid configuration")?;

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::with_ttl(None));
    let engine = Arc::new(TesseractEngine::new(&config.tesseract_bin));
    let submitter = JobSubmitter::new(ImageProcessor::new(store.clone(), engine, &config), &config);

    let started = Instant::now();
    let (submission, handle) = submitter.submit(images).await.context("Submission failed")?;
    let succeeded = handle.wait().await.context("Job failed")?;
    let job = store
        .get(&submission.job_id)
        .await
        .context("Job vanished from store")?;

    let json = serde_json::to_string_pretty(&job.records).context("Failed to serialise records")?;
    if let Some(ref path) = args.output {
        tokio::fs::write(path, format!("{json}\n"))
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    }

    let total = job.records.len();
    if !quiet && !show_progress {
        eprintln!(
            "Recognised {}/{} images in {}ms",
            succeeded,
            total,
            started.elapsed().as_millis()
        );
    }

    if succeeded == 0 {
        anyhow::bail!("All {} images failed", total);
    }
    Ok(())
}

/// Map the shared engine flags onto a config builder.
fn engine_builder(args: &EngineArgs) -> ServiceConfigBuilder {
    ServiceConfig::builder()
        .language(&args.language)
        .tesseract_bin(&args.tesseract_bin)
        .concurrency(args.concurrency)
        .ocr_timeout(Duration::from_secs(args.ocr_timeout))
        .strict_parsing(args.strict)
}
