//! CLI binary for edgequake-ingest.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! to `IngestConfig`, feeds events to `EventHandler`, and prints responses.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_ingest::{
    Deadline, EventHandler, HandlerResponse, IngestConfig, IngestProgressCallback,
    ObjectLocation, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_invocation_start(&self, total_pages: usize, start_page: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_position(start_page as u64);
        self.bar.set_prefix("Transcribing");
        if start_page > 0 {
            self.bar
                .println(format!("{} resuming at page {}", cyan("◆"), start_page + 1));
        }
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_committed(&self, page_num: usize, total_pages: usize, text_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{text_len:>5} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_checkpoint(&self, next_page_index: usize, total_pages: usize) {
        self.bar.println(format!(
            "  {} budget low, checkpoint queued at page {}/{}",
            cyan("⏸"),
            next_page_index + 1,
            total_pages
        ));
    }

    fn on_invocation_complete(&self, _total_pages: usize, _committed: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload a local PDF into the raw bucket and transcribe it
  ingest submit report.pdf --bucket raw

  # Replay a trigger event (storage notification or queue delivery)
  ingest handle event.json

  # Run queued continuations until the queue is empty
  ingest drain

ENVIRONMENT VARIABLES:
  SQS_QUEUE_URL           Hand-off queue (spool directory)
  OUTPUT_BUCKET           Bucket receiving transcripts
  AWS_REGION              Deployment region
  EDGEQUAKE_LLM_PROVIDER  Provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Model ID
  PDFIUM_LIB_PATH         Directory holding libpdfium
"#;

/// Event-triggered document ingestion with resumable PDF transcription.
#[derive(Parser, Debug)]
#[command(
    name = "ingest",
    version,
    about = "Event-triggered document ingestion with resumable PDF transcription",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory of the local object store (one sub-directory per bucket).
    #[arg(long, global = true, env = "INGEST_STORAGE_ROOT", default_value = "spool/buckets")]
    storage_root: PathBuf,

    /// Hand-off queue directory.
    #[arg(long, global = true, env = "SQS_QUEUE_URL", default_value = "spool/queue")]
    queue: PathBuf,

    /// Bucket receiving transcription artifacts.
    #[arg(long, global = true, env = "OUTPUT_BUCKET", default_value = "output")]
    output_bucket: String,

    /// Bucket receiving PDFs converted from office documents.
    #[arg(long, global = true, env = "INTERIM_BUCKET", default_value = "interim-pdf")]
    interim_bucket: String,

    /// Bucket holding per-video frame labels.
    #[arg(long, global = true, env = "FRAMES_BUCKET", default_value = "frames")]
    frames_bucket: String,

    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Execution budget of one invocation, in seconds.
    #[arg(long, global = true, env = "INGEST_BUDGET_SECS", default_value_t = 900)]
    budget_secs: u64,

    /// Checkpoint once less than this many seconds remain.
    #[arg(long, global = true, env = "INGEST_THRESHOLD_SECS", default_value_t = 120)]
    threshold_secs: u64,

    /// Retries per model call on transient failures.
    #[arg(long, global = true, env = "INGEST_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Image shrinks per model call on size rejections.
    #[arg(long, global = true, env = "INGEST_MAX_RESIZES", default_value_t = 5)]
    max_resizes: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "INGEST_PDF_PASSWORD")]
    password: Option<String>,

    /// Directory holding the pdfium shared library.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// LibreOffice binary used for office conversions.
    #[arg(long, global = true, env = "SOFFICE_PATH")]
    soffice: Option<PathBuf>,

    /// Resume exactly at the checkpoint even if the artifact disagrees.
    #[arg(long, global = true)]
    no_reconcile: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "INGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "INGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one trigger event read from a file, or stdin with "-".
    Handle { event: PathBuf },

    /// Store a local file and process the resulting upload notification.
    Submit {
        file: PathBuf,
        /// Bucket to upload into.
        #[arg(long, default_value = "raw")]
        bucket: String,
        /// Object key. Defaults to the file name.
        #[arg(long)]
        key: Option<String>,
    },

    /// Process queued continuations until the queue is empty.
    Drain {
        /// Stop after this many invocations.
        #[arg(long)]
        max_invocations: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Suppress INFO-level library logs when the progress bar is active
    let show_progress = !cli.quiet && !cli.no_progress;
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

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;
    let handler = EventHandler::from_config(config).context("Failed to initialise handler")?;
    let budget = Duration::from_secs(cli.budget_secs);

    match &cli.command {
        Command::Handle { event } => {
            let raw = if event.as_os_str() == "-" {
                let mut buf = String::new();
                io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read event from stdin")?;
                buf
            } else {
                tokio::fs::read_to_string(event)
                    .await
                    .with_context(|| format!("Failed to read event from {:?}", event))?
            };
            let event: serde_json::Value =
                serde_json::from_str(&raw).context("Event is not valid JSON")?;
            let response = handler.handle(&event, &Deadline::after(budget)).await;
            report(&response, cli.quiet)?;
        }
        Command::Submit { file, bucket, key } => {
            let key = match key {
                Some(k) => k.clone(),
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .context("File name is not valid UTF-8; pass --key")?,
            };
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("Failed to read {:?}", file))?;
            let location = ObjectLocation::new(bucket, &key);
            handler
                .collaborators()
                .store
                .put(&location, bytes)
                .await
                .context("Failed to store source object")?;

            let event = json!({"Records": [{"s3": {
                "bucket": {"name": bucket},
                "object": {"key": urlencoding::encode(&key)}
            }}]});
            let response = handler.handle(&event, &Deadline::after(budget)).await;
            report(&response, cli.quiet)?;
        }
        Command::Drain { max_invocations } => {
            let mut invocations = 0usize;
            while max_invocations.is_none_or(|max| invocations < max) {
                let Some(message) = handler
                    .collaborators()
                    .queue
                    .receive()
                    .await
                    .context("Failed to read queue")?
                else {
                    break;
                };
                invocations += 1;
                let response = handler
                    .handle(&message.to_event(), &Deadline::after(budget))
                    .await;
                report(&response, cli.quiet)?;
            }
            if !cli.quiet {
                eprintln!("{} {} continuation(s) processed", green("✔"), invocations);
            }
        }
    }

    Ok(())
}

/// Print the response body and fail on a non-2xx status.
fn report(response: &HandlerResponse, quiet: bool) -> Result<()> {
    println!("{}", response.body);
    if !response.is_success() {
        anyhow::bail!("{} invocation failed with status {}", red("✘"), response.status_code);
    }
    if !quiet {
        eprintln!("{} status {}", green("✔"), response.status_code);
    }
    Ok(())
}

/// Map CLI args to `IngestConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .storage_root(&cli.storage_root)
        .queue_endpoint(&cli.queue)
        .output_bucket(&cli.output_bucket)
        .interim_bucket(&cli.interim_bucket)
        .frames_bucket(&cli.frames_bucket)
        .budget_threshold(Duration::from_secs(cli.threshold_secs))
        .max_retries(cli.max_retries)
        .max_resizes(cli.max_resizes)
        .reconcile_on_resume(!cli.no_reconcile);

    if let Some(ref region) = cli.region {
        builder = builder.region(region);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref dir) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(dir);
    }
    if let Some(ref soffice) = cli.soffice {
        builder = builder.soffice_path(soffice);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
