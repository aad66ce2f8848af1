//! Error types for the scan2json library.
//!
//! Three error types reflect three distinct failure layers:
//!
//! * [`ChainError`] (**Fatal**): the chain cannot produce its payload (image
//!   unreadable, provider not configured, a stage failed after retries, or the
//!   model's reply could not be recovered). Returned as `Err(ChainError)` from
//!   every `ChainController::run_*` operation.
//!
//! * [`ModelError`] (**Per call**): a single model invocation failed. The
//!   controller inspects [`ModelError::is_transient`] to decide whether a
//!   retry can help, and wraps the last one in [`ChainError::StageFailed`].
//!
//! * [`RecoveryError`] (**Per reply**): the normalised text did not yield a
//!   payload of the expected shape.

use crate::prompts::TaskKind;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scan2json library.
#[derive(Debug, Error)]
pub enum ChainError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The image could not be read from disk.
    #[error("Failed to read image '{path}': {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input string is neither a readable path nor an HTTP/HTTPS URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but the download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A chain stage failed and the chain was halted.
    #[error("Stage '{stage}' failed after {attempts} attempt(s): {source}")]
    StageFailed {
        stage: TaskKind,
        attempts: u32,
        #[source]
        source: ModelError,
    },

    /// The model answered, but nothing usable could be recovered from the reply.
    #[error("Stage '{stage}' returned a malformed response: {source}")]
    MalformedResponse {
        stage: TaskKind,
        #[source]
        source: RecoveryError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChainError {
    /// True when the failure originated upstream at the model provider, either
    /// as a failed call or as an unusable reply.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ChainError::StageFailed { .. } | ChainError::MalformedResponse { .. }
        )
    }
}

/// A failed model invocation.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ModelError {
    /// Provider answered HTTP 429.
    #[error("rate limit exceeded{}", retry_hint(*retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// 5xx, connection reset and similar blips.
    #[error("transient failure: {detail}")]
    Transient { detail: String },

    /// The call did not finish within the configured timeout.
    #[error("call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// 401/403: retrying will not help.
    #[error("authentication failed: {detail}")]
    Auth { detail: String },

    /// Any other provider error.
    #[error("{detail}")]
    Failed { detail: String },
}

fn retry_hint(secs: Option<u64>) -> String {
    match secs {
        Some(s) => format!(" (retry after {s}s)"),
        None => String::new(),
    }
}

impl ModelError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::RateLimited { .. } | ModelError::Transient { .. } | ModelError::Timeout { .. }
        )
    }
}

/// Why the recovery parser could not turn normalised text into a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum RecoveryError {
    /// Nothing was left after normalisation.
    #[error("response contained no payload")]
    Empty,

    /// Neither candidate text parsed as JSON.
    #[error("invalid JSON at line {line}, column {column}: {message}")]
    InvalidJson {
        line: usize,
        column: usize,
        message: String,
    },

    /// The JSON parsed but does not have the expected shape.
    #[error("unexpected payload shape: {message}")]
    SchemaMismatch { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_display_with_retry() {
        let e = ModelError::RateLimited {
            retry_after_secs: Some(12),
        };
        assert_eq!(e.to_string(), "rate limit exceeded (retry after 12s)");
    }

    #[test]
    fn rate_limit_display_without_retry() {
        let e = ModelError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(e.to_string(), "rate limit exceeded");
    }

    #[test]
    fn transient_classification() {
        assert!(ModelError::Timeout { secs: 5 }.is_transient());
        assert!(ModelError::Transient { detail: "503".into() }.is_transient());
        assert!(!ModelError::Auth { detail: "bad key".into() }.is_transient());
        assert!(!ModelError::Failed { detail: "400".into() }.is_transient());
    }

    #[test]
    fn stage_failed_display() {
        let e = ChainError::StageFailed {
            stage: TaskKind::QuestionOcr,
            attempts: 4,
            source: ModelError::Timeout { secs: 60 },
        };
        let msg = e.to_string();
        assert!(msg.contains("question-ocr"), "got: {msg}");
        assert!(msg.contains("4 attempt"), "got: {msg}");
        assert!(e.is_upstream());
    }

    #[test]
    fn image_read_is_not_upstream() {
        let e = ChainError::ImageRead {
            path: PathBuf::from("/nope.png"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(!e.is_upstream());
        assert!(e.to_string().contains("/nope.png"));
    }

    #[test]
    fn invalid_json_display() {
        let e = RecoveryError::InvalidJson {
            line: 1,
            column: 7,
            message: "expected value".into(),
        };
        assert!(e.to_string().contains("column 7"));
    }
}
