//! Model client: the seam between the chain and the hosted model.
//!
//! The chain only ever talks to [`ModelClient`]. The production
//! implementation, [`ProviderClient`], forwards to an `edgequake-llm`
//! provider; tests and embedders can supply their own. Nothing here assumes
//! more about the provider than "returns text or fails".
//!
//! ## Message Layout
//!
//! 1. **System message**: the task's system instruction
//! 2. **User message**: the task instruction (plus any prior-stage output),
//!    with the page image attached for OCR tasks

use crate::config::{ChainConfig, DEFAULT_MODEL};
use crate::error::{ChainError, ModelError};
use crate::pipeline::encode::EncodedImage;
use crate::prompts::TaskKind;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// One call to the model, built fresh per stage.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub task: TaskKind,
    pub system: String,
    pub text: String,
    pub image: Option<EncodedImage>,
}

/// Sampling and transport knobs for a single call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallOptions {
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout: Duration,
}

impl From<&ChainConfig> for CallOptions {
    fn from(config: &ChainConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

/// A successful completion.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

impl ModelResponse {
    /// A response carrying only text, for clients without usage accounting.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Anything that can answer a [`ModelRequest`].
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Short label for logs, e.g. `"openai/gpt-4.1-mini"`.
    fn name(&self) -> &str;

    async fn invoke(
        &self,
        request: &ModelRequest,
        options: &CallOptions,
    ) -> Result<ModelResponse, ModelError>;
}

/// [`ModelClient`] backed by an `edgequake-llm` provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Resolve a provider from the config, most-specific first:
    ///
    /// 1. `config.provider`: a pre-built provider, used as-is
    /// 2. `config.provider_name` + `config.model` (model defaults to [`DEFAULT_MODEL`])
    /// 3. `SCAN2JSON_PROVIDER` + `SCAN2JSON_MODEL`, when both are set
    /// 4. `OPENAI_API_KEY` present → OpenAI (covers OpenAI-compatible gateways)
    /// 5. `ProviderFactory::from_env` auto-detection
    ///
    /// API keys are read by the provider factory and not validated here; a
    /// missing key surfaces as an authentication failure on the first call.
    pub fn from_config(config: &ChainConfig) -> Result<Self, ChainError> {
        if let Some(ref provider) = config.provider {
            return Ok(Self::new(Arc::clone(provider), "custom"));
        }

        if let Some(ref name) = config.provider_name {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return Self::named(name, model);
        }

        if let (Ok(prov), Ok(model)) = (
            std::env::var("SCAN2JSON_PROVIDER"),
            std::env::var("SCAN2JSON_MODEL"),
        ) {
            if !prov.is_empty() && !model.is_empty() {
                return Self::named(&prov, &model);
            }
        }

        if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
            if !openai_key.is_empty() {
                let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
                return Self::named("openai", model);
            }
        }

        let (llm_provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| ChainError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                    Set OPENAI_API_KEY (or another provider key), or pass --provider.\n\
                    Error: {}",
                    e
                ),
            })?;
        Ok(Self::new(llm_provider, "auto"))
    }

    fn named(provider_name: &str, model: &str) -> Result<Self, ChainError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            ChainError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, format!("{provider_name}/{model}")))
    }
}

#[async_trait]
impl ModelClient for ProviderClient {
    fn name(&self) -> &str {
        &self.label
    }

    async fn invoke(
        &self,
        request: &ModelRequest,
        options: &CallOptions,
    ) -> Result<ModelResponse, ModelError> {
        let start = Instant::now();
        let messages = build_messages(request);
        let completion = CompletionOptions {
            temperature: Some(options.temperature),
            max_tokens: Some(options.max_tokens),
            ..Default::default()
        };

        let call = self.provider.chat(&messages, Some(&completion));
        let response = match tokio::time::timeout(options.timeout, call).await {
            Err(_) => {
                return Err(ModelError::Timeout {
                    secs: options.timeout.as_secs(),
                })
            }
            Ok(Err(e)) => return Err(classify_error(&e.to_string())),
            Ok(Ok(response)) => response,
        };

        let duration = start.elapsed();
        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            request.task, response.prompt_tokens, response.completion_tokens, duration
        );

        Ok(ModelResponse {
            content: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

fn build_messages(request: &ModelRequest) -> Vec<ChatMessage> {
    let user = match request.image {
        Some(ref image) => {
            ChatMessage::user_with_images(request.text.as_str(), vec![image.to_image_data()])
        }
        None => ChatMessage::user(request.text.as_str()),
    };
    vec![ChatMessage::system(request.system.as_str()), user]
}

static RE_RETRY_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)retry[- _]?after\D{0,8}(\d+)").unwrap());

// A status code only counts at the start of the message or right after
// "HTTP" / "status"; token counts and byte sizes elsewhere are ignored.
static RE_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^\W*|\bhttp(?:/\d(?:\.\d)?)?\s*|\bstatus(?:\s*code)?\s*[:=]?\s*|\()([1-5]\d\d)\b")
        .unwrap()
});

/// Map a provider error message onto the retry taxonomy.
///
/// Providers surface HTTP status and rate-limit hints only as text. An
/// explicit status code decides; otherwise keywords do.
pub fn classify_error(message: &str) -> ModelError {
    let detail = || message.to_string();
    let rate_limited = || ModelError::RateLimited {
        retry_after_secs: RE_RETRY_AFTER
            .captures(message)
            .and_then(|c| c[1].parse().ok()),
    };

    let status = RE_STATUS
        .captures(message)
        .and_then(|c| c[1].parse::<u16>().ok());
    if let Some(code) = status {
        return match code {
            429 => rate_limited(),
            401 | 403 => ModelError::Auth { detail: detail() },
            408 | 500..=599 => ModelError::Transient { detail: detail() },
            _ => ModelError::Failed { detail: detail() },
        };
    }

    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if has(&["rate limit", "rate_limit", "too many requests"]) {
        return rate_limited();
    }
    if has(&["unauthorized", "forbidden", "invalid api key", "authentication"]) {
        return ModelError::Auth { detail: detail() };
    }
    if has(&[
        "timeout",
        "timed out",
        "overloaded",
        "connection",
        "temporarily unavailable",
        "service unavailable",
        "bad gateway",
        "internal server error",
    ]) {
        return ModelError::Transient { detail: detail() };
    }
    ModelError::Failed { detail: detail() }
}
