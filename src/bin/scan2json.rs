//! CLI binary for scan2json.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ChainConfig`, runs one chain and prints the JSON result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scan2json::{
    ChainConfig, ChainController, ChainProgressCallback, ChainStats, ProgressCallback, RateLimit,
    TaskKind,
};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the chain's stages plus a log
/// line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<TaskKind, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {pos}/{len} stages  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Chaining");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, stage: TaskKind) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&stage))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ChainProgressCallback for CliProgressCallback {
    fn on_chain_start(&self, total_stages: usize) {
        self.bar.set_length(total_stages as u64);
        self.bar.reset_eta();
    }

    fn on_stage_start(&self, stage: TaskKind, _index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(stage, Instant::now());
        }
        self.bar.set_message(stage.to_string());
    }

    fn on_stage_wait(&self, stage: TaskKind, wait: Duration) {
        self.bar
            .set_message(format!("{stage} {}", dim(&format!("(waited {:.1}s)", wait.as_secs_f64()))));
    }

    fn on_stage_complete(&self, stage: TaskKind, index: usize, total: usize, output_len: usize) {
        let secs = self.elapsed_secs(stage);
        self.bar.println(format!(
            "  {} {}/{}  {:<26}  {}  {}",
            green("✓"),
            index,
            total,
            stage.as_str(),
            dim(&format!("{output_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_stage_error(&self, stage: TaskKind, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(stage);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}/{}  {:<26}  {}  {}",
            red("✗"),
            index,
            total,
            stage.as_str(),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_chain_complete(&self, total_stages: usize, completed_stages: usize) {
        self.bar.finish_and_clear();
        if completed_stages == total_stages {
            eprintln!("{} {} stages completed", green("✔"), bold(&completed_stages.to_string()));
        } else {
            eprintln!(
                "{} chain halted after {}/{} stages",
                red("✘"),
                bold(&completed_stages.to_string()),
                total_stages
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Vocabulary groups from a stitched passage image
  scan2json vocab passage.png

  # Same, from a URL, full chain record as JSON
  scan2json --json vocab https://example.com/passage.jpg > vocab.json

  # Justify every answer of a reading test
  scan2json comprehension --passage p_1.png --questions q1.jpg --answers a1.jpg

  # A single OCR stage
  scan2json ocr --task questions q1.jpg

  # Different provider/model, no local rate limiting
  scan2json --provider anthropic --model claude-sonnet-4-20250514 --rate-interval 0 vocab p.png

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI (or OpenAI-compatible gateway) API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  SCAN2JSON_PROVIDER      Provider name (openai, anthropic, gemini, ollama, ...)
  SCAN2JSON_MODEL         Model ID
  RUST_LOG                Log filter, overrides --verbose / --quiet

  Variables may also be placed in a .env file in the working directory.
"#;

/// Extract reading-test pages to JSON and chain them into analysis prompts.
#[derive(Parser, Debug)]
#[command(
    name = "scan2json",
    version,
    about = "Extract reading-test pages to JSON with Vision LLMs and chain them into analysis",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    opts: CommonOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR a stitched passage image and group its vocabulary by meaning.
    Vocab {
        /// Local image path or HTTP/HTTPS URL.
        image: String,
    },
    /// OCR passage, questions and answers, then justify each answer.
    Comprehension {
        #[arg(long)]
        passage: String,
        #[arg(long)]
        questions: String,
        #[arg(long)]
        answers: String,
    },
    /// Run a single OCR stage and print its validated JSON.
    Ocr {
        #[arg(long, value_enum)]
        task: OcrTaskArg,
        /// Local image path or HTTP/HTTPS URL.
        image: String,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrTaskArg {
    Passage,
    StitchedPassage,
    Questions,
    Answers,
}

impl From<OcrTaskArg> for TaskKind {
    fn from(v: OcrTaskArg) -> Self {
        match v {
            OcrTaskArg::Passage => TaskKind::PassageOcr,
            OcrTaskArg::StitchedPassage => TaskKind::StitchedPassageOcr,
            OcrTaskArg::Questions => TaskKind::QuestionOcr,
            OcrTaskArg::Answers => TaskKind::AnswerOcr,
        }
    }
}

#[derive(Args, Debug)]
struct CommonOpts {
    /// LLM model ID.
    #[arg(long, global = true, env = "SCAN2JSON_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "SCAN2JSON_PROVIDER")]
    provider: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, global = true, env = "SCAN2JSON_TEMPERATURE", default_value_t = 1.0)]
    temperature: f32,

    /// Max completion tokens per call.
    #[arg(long, global = true, env = "SCAN2JSON_MAX_TOKENS", default_value_t = 3500)]
    max_tokens: usize,

    /// Retries per call on transient failures.
    #[arg(long, global = true, env = "SCAN2JSON_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Seconds between model calls (token refill interval); 0 disables the limiter.
    #[arg(long, global = true, env = "SCAN2JSON_RATE_INTERVAL", default_value_t = 10)]
    rate_interval: u64,

    /// Calls allowed back to back before the interval applies.
    #[arg(long, global = true, env = "SCAN2JSON_RATE_BURST", default_value_t = 1)]
    rate_burst: u32,

    /// Per-call timeout in seconds.
    #[arg(long, global = true, env = "SCAN2JSON_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Download timeout for URL inputs in seconds.
    #[arg(long, global = true, env = "SCAN2JSON_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Write the result to this file instead of stdout.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Print the full chain record (stages, raw replies, stats), not just the payload.
    #[arg(long, global = true)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "SCAN2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let opts = &cli.opts;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar covers INFO-level feedback, so logs drop to errors
    // while it is shown.
    let show_progress = !opts.quiet && !opts.no_progress;
    let filter = if opts.verbose {
        "debug"
    } else if opts.quiet || show_progress {
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ChainProgressCallback>)
    } else {
        None
    };

    let config = build_config(opts, progress_cb)?;
    let chain = ChainController::from_config(config).context("Failed to set up the model client")?;

    // ── Run chain ────────────────────────────────────────────────────────
    let (rendered, stats) = match &cli.command {
        Command::Vocab { image } => {
            let out = chain.run_vocabulary(image).await.context("Vocabulary chain failed")?;
            (render(&out, &out.payload, opts.json)?, out.stats)
        }
        Command::Comprehension {
            passage,
            questions,
            answers,
        } => {
            let out = chain
                .run_comprehension(passage, questions, answers)
                .await
                .context("Comprehension chain failed")?;
            (render(&out, &out.payload, opts.json)?, out.stats)
        }
        Command::Ocr { task, image } => {
            let out = chain
                .run_ocr((*task).into(), image)
                .await
                .context("OCR failed")?;
            (render(&out, &out.payload, opts.json)?, out.stats)
        }
    };

    // ── Write output ─────────────────────────────────────────────────────
    match opts.output {
        Some(ref path) => {
            tokio::fs::write(path, format!("{rendered}\n"))
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !opts.quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{rendered}").context("Failed to write to stdout")?;
        }
    }

    if !opts.quiet {
        print_summary(&stats);
    }
    Ok(())
}

/// Pretty JSON of the whole chain record (`--json`) or just the payload.
fn render<O: Serialize, P: Serialize>(record: &O, payload: &P, full: bool) -> Result<String> {
    let json = if full {
        serde_json::to_string_pretty(record)
    } else {
        serde_json::to_string_pretty(payload)
    };
    json.context("Failed to serialise output")
}

fn print_summary(stats: &ChainStats) {
    eprintln!(
        "   {} tokens in  /  {} tokens out  /  {} retries  {}",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
        stats.total_retries,
        cyan(&format!(
            "{:.1}s total, {:.1}s waiting",
            stats.total_duration_ms as f64 / 1000.0,
            stats.waited_ms as f64 / 1000.0
        )),
    );
}

/// Map CLI args to `ChainConfig`.
fn build_config(opts: &CommonOpts, progress: Option<ProgressCallback>) -> Result<ChainConfig> {
    let rate_limit = (opts.rate_interval > 0)
        .then(|| RateLimit::new(opts.rate_burst, Duration::from_secs(opts.rate_interval)));

    let mut builder = ChainConfig::builder()
        .temperature(opts.temperature)
        .max_tokens(opts.max_tokens)
        .max_retries(opts.max_retries)
        .rate_limit(rate_limit)
        .api_timeout_secs(opts.api_timeout)
        .download_timeout_secs(opts.download_timeout);

    if let Some(ref model) = opts.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = opts.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
