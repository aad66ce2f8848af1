//! # scan2json
//!
//! Turn scanned reading-test pages into structured JSON with a hosted
//! Vision Language Model, then chain the extracted text into text-only
//! analysis prompts.
//!
//! ## Why this crate?
//!
//! The model does the hard part (reading the page, understanding it). What
//! it does badly is answer in clean JSON: replies come wrapped in code
//! fences, prefixed with prose, or written with single quotes. This crate
//! owns everything around the model call: prompts, image transport, reply
//! normalisation and recovery parsing, the vocabulary word filter, and a
//! chaining controller with a rate limiter and bounded retry.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image (path / URL)
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Encode     bytes → base64 data URI
//!  ├─ 3. OCR        vision call with a task-specific prompt
//!  ├─ 4. Normalise  fences, prose, quotes → JSON text (+ diagnostics)
//!  ├─ 5. Filter     (vocabulary) stopwords, numerals, proper nouns out
//!  ├─ 6. Analyse    text-only call fed by the previous stage(s)
//!  └─ 7. Parse      recovery parser + typed schema validation
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scan2json::{ChainConfig, ChainController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from SCAN2JSON_PROVIDER / OPENAI_API_KEY / …
//!     let chain = ChainController::from_config(ChainConfig::default())?;
//!     let output = chain.run_vocabulary("passage.png").await?;
//!     for group in &output.payload.groups {
//!         println!("group {}: {} words", group.group_number, group.words.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `scan2json` binary (clap + indicatif + tracing-subscriber) |
//! | `server` | on      | The `server` module and `scan2json-server` binary (axum + tower-http) |
//!
//! ```toml
//! scan2json = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chain;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chain::ChainController;
pub use config::{ChainConfig, ChainConfigBuilder, RateLimit, DEFAULT_MODEL};
pub use error::{ChainError, ModelError, RecoveryError};
pub use output::{ChainOutput, ChainStats, StageResult};
pub use pipeline::client::{CallOptions, ModelClient, ModelRequest, ModelResponse, ProviderClient};
pub use pipeline::filter::{filter_vocabulary, CandidateWordSet};
pub use pipeline::normalize::{normalize_response, Diagnostic, NormalizeMode, NormalizedText};
pub use progress::{ChainProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{PromptTemplate, TaskKind};
pub use schema::{
    AnswerExtraction, AnswerReasoning, ComprehensionReport, ParagraphExtraction, PassageOcr,
    QuestionExtraction, Validate, VocabGroup, VocabWord, VocabularyAnalysis,
};
