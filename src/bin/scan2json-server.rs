//! HTTP server binary: `POST /vocab` in front of the vocabulary chain.

use anyhow::{Context, Result};
use clap::Parser;
use scan2json::server::{build_router, serve};
use scan2json::{ChainConfig, ChainController, RateLimit};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Serve the vocabulary pipeline over HTTP.
#[derive(Parser, Debug)]
#[command(name = "scan2json-server", version, about = "Serve the vocabulary pipeline over HTTP")]
struct Cli {
    /// Bind address.
    #[arg(long, env = "SCAN2JSON_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port.
    #[arg(long, env = "SCAN2JSON_PORT", default_value_t = 5000)]
    port: u16,

    /// LLM model ID.
    #[arg(long, env = "SCAN2JSON_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "SCAN2JSON_PROVIDER")]
    provider: Option<String>,

    /// Seconds between model calls, shared by all requests; 0 disables the limiter.
    #[arg(long, env = "SCAN2JSON_RATE_INTERVAL", default_value_t = 10)]
    rate_interval: u64,

    /// Calls allowed back to back before the interval applies.
    #[arg(long, env = "SCAN2JSON_RATE_BURST", default_value_t = 1)]
    rate_burst: u32,

    /// Retries per call on transient failures.
    #[arg(long, env = "SCAN2JSON_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call timeout in seconds.
    #[arg(long, env = "SCAN2JSON_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info,tower_http=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let rate_limit = (cli.rate_interval > 0)
        .then(|| RateLimit::new(cli.rate_burst, Duration::from_secs(cli.rate_interval)));
    let mut builder = ChainConfig::builder()
        .rate_limit(rate_limit)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);
    if let Some(model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    let config = builder.build().context("Invalid configuration")?;

    let chain = ChainController::from_config(config).context("Failed to set up the model client")?;
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", cli.host, cli.port))?;

    serve(addr, build_router(Arc::new(chain)))
        .await
        .context("Server error")
}
