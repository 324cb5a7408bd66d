//! CLI binary for edgequake-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, sets up logging, and prints the batch summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_extract::{
    extract_directory, BatchProgressCallback, BatchSummary, DirectorySource, DocumentSource,
    ExtractionConfig, ExtractionSchema, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Keep error lines on one terminal row.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per document.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, document: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(document))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting extraction of {total} documents…"))
        ));
    }

    fn on_document_skipped(&self, index: usize, total: usize, document: &str) {
        self.bar.println(format!(
            "  {} [{:>3}/{:<3}] {}  {}",
            dim("↷"),
            index + 1,
            total,
            document,
            dim("already extracted")
        ));
        self.bar.inc(1);
    }

    fn on_document_start(&self, _index: usize, _total: usize, document: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(document.to_string(), Instant::now());
        }
        self.bar.set_message(document.to_string());
    }

    fn on_retry(&self, document: &str, attempt: u32, delay: Duration, error: &str) {
        self.bar.println(format!(
            "  {} {}  attempt {} failed: {}  {}",
            yellow("↻"),
            document,
            attempt,
            truncate(error, 70),
            dim(&format!("retrying in {}s", delay.as_secs()))
        ));
    }

    fn on_document_complete(&self, index: usize, total: usize, document: &str) {
        let secs = self.elapsed_secs(document);
        self.bar.println(format!(
            "  {} [{:>3}/{:<3}] {}  {}",
            green("✓"),
            index + 1,
            total,
            document,
            dim(&format!("{secs:.1}s"))
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, document: &str, error: &str) {
        let secs = self.elapsed_secs(document);
        self.bar.println(format!(
            "  {} [{:>3}/{:<3}] {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            document,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s"))
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total: usize, _succeeded: usize, _skipped: usize, _failed: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every PDF in ./pdfs with the fields in ./queries.yaml
  paper-extract

  # Different folders and model
  paper-extract -s fields.yaml -i papers/ -o out/ --model qwen2.5:14b

  # Use a cloud provider instead of the local Ollama server
  paper-extract --provider openai --model gpt-4.1-mini

  # Pre-extracted text (pages separated by form feeds, as pdftotext writes)
  paper-extract --extension txt -i texts/

  # Print the compiled JSON Schema and exit (no model needed)
  paper-extract --show-schema

  # Machine-readable summary
  paper-extract --json --no-progress > summary.json

FIELD DESCRIPTORS (queries.yaml):
  - item_name: publication_year          # output key (unique)
    question: In which year was it published?
    hint: Use the conference year        # optional
    examples:                            # optional
      - input: "NeurIPS 2017"
        output: "2017"
    output_type: integer                 # string | integer | float | boolean
                                         # | list[string] | list[integer]
    is_required: true                    # default false

OUTPUTS:
  <output-dir>/<stem>.json   one result per document (its presence = done)
  <failure-log>              one JSON line per failed document

  Re-running skips documents that already have a result file. Delete a
  result file to extract that document again.

ENVIRONMENT VARIABLES:
  EDGEQUAKE_LLM_PROVIDER  Provider when --provider is not given
  EDGEQUAKE_MODEL         Model paired with EDGEQUAKE_LLM_PROVIDER
  OLLAMA_HOST             Ollama endpoint (default http://localhost:11434)
  OPENAI_API_KEY          Required for --provider openai
  ANTHROPIC_API_KEY       Required for --provider anthropic
  PDFIUM_LIB_PATH         Path to libpdfium if not on the library search path
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Extract structured data from PDF documents with an LLM, driven by a
/// declarative list of fields.
#[derive(Parser, Debug)]
#[command(
    name = "paper-extract",
    version,
    about = "Schema-driven structured data extraction from PDF documents using LLMs",
    long_about = "Extract one structured JSON record per document. The fields are declared in a \
YAML/JSON descriptor file; each document's text is sent to a language model (local Ollama by \
default, or any edgequake-llm provider) and the answer is validated against the compiled schema. \
Documents that already have a result are skipped, so interrupted runs can simply be restarted.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Field descriptor file (YAML or JSON).
    #[arg(short, long, env = "PAPER_EXTRACT_SCHEMA", default_value = "queries.yaml")]
    schema: PathBuf,

    /// Directory containing the documents to process.
    #[arg(short, long, env = "PAPER_EXTRACT_INPUT_DIR", default_value = "pdfs")]
    input_dir: PathBuf,

    /// Directory receiving one JSON result per document.
    #[arg(short, long, env = "PAPER_EXTRACT_OUTPUT_DIR", default_value = "results")]
    output_dir: PathBuf,

    /// JSON Lines failure log. Default: <output-dir>/failures.jsonl.
    #[arg(long, env = "PAPER_EXTRACT_FAILURE_LOG")]
    failure_log: Option<PathBuf>,

    /// Document file extension: pdf, or txt for form-feed-separated text.
    #[arg(long, env = "PAPER_EXTRACT_EXTENSION", default_value = "pdf")]
    extension: String,

    /// LLM model ID.
    #[arg(long, env = "PAPER_EXTRACT_MODEL", default_value = "academic-extractor")]
    model: String,

    /// LLM provider: ollama, openai, anthropic, gemini, azure, …
    #[arg(
        long,
        env = "PAPER_EXTRACT_PROVIDER",
        long_help = "LLM provider. If not set, EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL are used \
          when both are set, otherwise the local Ollama server."
    )]
    provider: Option<String>,

    /// Title of the compiled schema.
    #[arg(long, env = "PAPER_EXTRACT_SCHEMA_NAME", default_value = "AcademicPaperExtraction")]
    schema_name: String,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PAPER_EXTRACT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per document.
    #[arg(long, env = "PAPER_EXTRACT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PAPER_EXTRACT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Backend attempts per document, including the first.
    #[arg(long, env = "PAPER_EXTRACT_MAX_ATTEMPTS", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..=20))]
    max_attempts: u32,

    /// Fixed part of the retry delay in seconds (delay = 2^attempt + base).
    #[arg(long, env = "PAPER_EXTRACT_BACKOFF_BASE", default_value_t = 5)]
    backoff_base: u64,

    /// Pause between documents in seconds.
    #[arg(long, env = "PAPER_EXTRACT_COOLDOWN", default_value_t = 5)]
    cooldown: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PAPER_EXTRACT_API_TIMEOUT", default_value_t = 1000)]
    api_timeout: u64,

    /// Also write logs (DEBUG level) to this file. Bare flag: debug.log.
    #[arg(long, env = "PAPER_EXTRACT_LOG_FILE", num_args = 0..=1,
          default_missing_value = "debug.log")]
    log_file: Option<PathBuf>,

    /// Print the compiled JSON Schema and exit.
    #[arg(long)]
    show_schema: bool,

    /// Print the batch summary as JSON on stdout.
    #[arg(long, env = "PAPER_EXTRACT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAPER_EXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPER_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPER_EXTRACT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.show_schema;
    init_logging(&cli, show_progress)?;

    // ── Schema ───────────────────────────────────────────────────────────
    let schema = ExtractionSchema::load(&cli.schema_name, &cli.schema)
        .with_context(|| format!("Failed to load field descriptors from {:?}", cli.schema))?;

    if cli.show_schema {
        let json = serde_json::to_string_pretty(&schema.json_schema())
            .context("Failed to serialise schema")?;
        println!("{json}");
        return Ok(());
    }

    // ── Input directory ──────────────────────────────────────────────────
    if !cli.input_dir.exists() {
        std::fs::create_dir_all(&cli.input_dir)
            .with_context(|| format!("Failed to create {:?}", cli.input_dir))?;
        eprintln!(
            "{} Created {}. Add .{} documents there and run again.",
            cyan("◆"),
            bold(&cli.input_dir.display().to_string()),
            cli.extension.trim_start_matches('.')
        );
        return Ok(());
    }

    let documents = DirectorySource::new(&cli.input_dir, &cli.extension)
        .list()
        .context("Failed to list documents")?;
    if documents.is_empty() {
        tracing::warn!(
            "No .{} documents in {}",
            cli.extension.trim_start_matches('.'),
            cli.input_dir.display()
        );
        if !cli.quiet && !cli.json {
            eprintln!(
                "{} No .{} documents found in {}",
                yellow("⚠"),
                cli.extension.trim_start_matches('.'),
                cli.input_dir.display()
            );
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    let summary = extract_directory(&cli.input_dir, &schema, &config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&summary, &config);
    }

    Ok(())
}

/// Console layer on stderr, plus an optional plain-text file layer.
fn init_logging(cli: &Cli, show_progress: bool) -> Result<()> {
    // The progress bar carries the per-document feedback; keep INFO lines
    // out of its way unless asked for.
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_filter(console_filter);

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,edgequake_extract=debug"));
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let failure_log = cli
        .failure_log
        .clone()
        .unwrap_or_else(|| cli.output_dir.join("failures.jsonl"));

    let mut builder = ExtractionConfig::builder()
        .model(&cli.model)
        .schema_name(&cli.schema_name)
        .output_dir(&cli.output_dir)
        .failure_log(failure_log)
        .extension(&cli.extension)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_attempts(cli.max_attempts)
        .backoff_base_secs(cli.backoff_base)
        .cooldown_secs(cli.cooldown)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(summary: &BatchSummary, config: &ExtractionConfig) {
    let mark = if summary.failed == 0 {
        green("✔")
    } else if summary.succeeded == 0 && summary.skipped == 0 {
        red("✘")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{}  {} extracted, {} skipped, {} failed  {}",
        mark,
        bold(&summary.succeeded.to_string()),
        summary.skipped,
        if summary.failed > 0 {
            red(&summary.failed.to_string())
        } else {
            summary.failed.to_string()
        },
        dim(&format!("{:.1}s", summary.duration_ms as f64 / 1000.0)),
    );
    eprintln!("   results  →  {}", bold(&config.output_dir.display().to_string()));
    if summary.failed > 0 {
        eprintln!(
            "   failures →  {}",
            bold(&config.failure_log.display().to_string())
        );
    }
}
