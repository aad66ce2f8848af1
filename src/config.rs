//! Configuration types for the extraction chains.
//!
//! Every knob lives in [`ChainConfig`], built via [`ChainConfigBuilder`] and
//! handed explicitly to [`crate::chain::ChainController`]. There is no
//! process-wide client or model state: two controllers with two configs can
//! run side by side against different providers.

use crate::error::ChainError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Vision-capable model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "meta-llama/Llama-3.2-11B-Vision-Instruct-Turbo";

/// Configuration for a chain run.
///
/// # Example
/// ```rust
/// use scan2json::ChainConfig;
///
/// let config = ChainConfig::builder()
///     .model("gpt-4.1-mini")
///     .max_retries(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct ChainConfig {
    /// LLM model identifier. If None, [`DEFAULT_MODEL`] is used with a named
    /// provider, or the provider default under auto-detection.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 1.0.
    pub temperature: f32,

    /// Maximum completion tokens per call. Default: 3500.
    ///
    /// A full IELTS passage runs to ~3000 words; lower values truncate the
    /// OCR JSON mid-string and the reply becomes unrecoverable.
    pub max_tokens: usize,

    /// Retries per call on a transient failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Provider budget enforced before every call. Default: one call per 10 s.
    /// `None` disables local rate limiting.
    pub rate_limit: Option<RateLimit>,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Receives stage events as the chain runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 1.0,
            max_tokens: 3500,
            max_retries: 3,
            retry_backoff_ms: 500,
            rate_limit: Some(RateLimit::default()),
            api_timeout_secs: 120,
            download_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("rate_limit", &self.rate_limit)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ChainProgressCallback>"),
            )
            .finish()
    }
}

impl ChainConfig {
    /// Create a new builder for `ChainConfig`.
    pub fn builder() -> ChainConfigBuilder {
        ChainConfigBuilder {
            config: Self::default(),
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Builder for [`ChainConfig`].
#[derive(Debug)]
pub struct ChainConfigBuilder {
    config: ChainConfig,
}

impl ChainConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn rate_limit(mut self, limit: Option<RateLimit>) -> Self {
        self.config.rate_limit = limit;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ChainConfig, ChainError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ChainError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ChainError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let Some(limit) = c.rate_limit {
            if limit.burst == 0 {
                return Err(ChainError::InvalidConfig(
                    "rate limit burst must be ≥ 1".into(),
                ));
            }
            if limit.interval.is_zero() {
                return Err(ChainError::InvalidConfig(
                    "rate limit interval must be non-zero; disable the limiter instead".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

/// Token-bucket budget: up to `burst` calls at once, one token regained per `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub burst: u32,
    #[serde(with = "duration_millis")]
    pub interval: Duration,
}

impl RateLimit {
    pub fn new(burst: u32, interval: Duration) -> Self {
        Self { burst, interval }
    }

    /// One call every `secs` seconds, no burst.
    pub fn every_secs(secs: u64) -> Self {
        Self::new(1, Duration::from_secs(secs))
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::every_secs(10)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
