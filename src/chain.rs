//! Chaining controller: runs dependent model calls in order.
//!
//! ## Pipelines
//!
//! ```text
//! vocabulary:     stitched-passage-ocr ──▶ filter ──▶ vocabulary-analysis
//! comprehension:  passage-ocr ──▶ question-ocr ──▶ answer-ocr ──▶ comprehension-reasoning
//! ```
//!
//! Every call passes through the same gate:
//!
//! 1. **Rate limiter**: a token bucket shared by every chain on this
//!    controller. With the default budget consecutive calls are 10 s apart.
//! 2. **Retry**: transient failures (`RateLimited`, `Transient`, `Timeout`)
//!    are retried up to `max_retries` times with exponential backoff
//!    (`retry_backoff_ms * 2^(attempt-1)`). A provider `retry-after` hint is
//!    pushed into the bucket. Auth and other failures are not retried.
//! 3. **Halt**: the first stage that fails for good ends the chain with
//!    [`ChainError::StageFailed`]; later stages are never attempted.

use crate::config::ChainConfig;
use crate::error::{ChainError, ModelError, RecoveryError};
use crate::output::{ChainOutput, ChainStats, StageResult};
use crate::pipeline::client::{
    CallOptions, ModelClient, ModelRequest, ModelResponse, ProviderClient,
};
use crate::pipeline::encode::{encode_image_file, EncodedImage};
use crate::pipeline::filter::filter_vocabulary_with;
use crate::pipeline::tagger::LexiconTagger;
use crate::pipeline::input::resolve_input;
use crate::pipeline::normalize::{normalize_response, NormalizeMode, NormalizedText};
use crate::pipeline::ratelimit::TokenBucket;
use crate::prompts::{comprehension_payload, vocabulary_payload, PromptTemplate, TaskKind};
use crate::schema::{
    AnswerExtraction, ComprehensionReport, ParagraphExtraction, PassageOcr, QuestionExtraction,
    Validate, VocabularyAnalysis,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Runs the extraction chains against one model client.
///
/// Cheap to share: a server wraps one controller in an `Arc` so all
/// requests draw from the same rate-limit budget.
pub struct ChainController {
    client: Arc<dyn ModelClient>,
    config: ChainConfig,
    limiter: Option<TokenBucket>,
}

impl ChainController {
    pub fn new(client: Arc<dyn ModelClient>, config: ChainConfig) -> Self {
        let limiter = config.rate_limit.map(TokenBucket::new);
        Self {
            client,
            config,
            limiter,
        }
    }

    /// Build the production client from `config` (see [`ProviderClient::from_config`]).
    pub fn from_config(config: ChainConfig) -> Result<Self, ChainError> {
        let client = ProviderClient::from_config(&config)?;
        info!("Using model client: {}", client.name());
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    // ── Pipelines ───────────────────────────────────────────────────────────

    /// OCR a stitched passage image, filter its words and group them by meaning.
    ///
    /// `image` is a local path or an HTTP(S) URL.
    pub async fn run_vocabulary(
        &self,
        image: &str,
    ) -> Result<ChainOutput<VocabularyAnalysis>, ChainError> {
        let encoded = self.load_image(image).await?;
        let mut run = self.begin(2);
        let result = self.vocabulary_stages(&mut run, encoded).await;
        run.finish(result)
    }

    async fn vocabulary_stages(
        &self,
        run: &mut Run<'_>,
        image: EncodedImage,
    ) -> Result<VocabularyAnalysis, ChainError> {
        let ocr_task = TaskKind::StitchedPassageOcr;
        let template = PromptTemplate::for_task(ocr_task);
        let passage = run
            .stage(ocr_task, template.user.to_string(), Some(image), NormalizeMode::Standard)
            .await?;

        // Every field is filtered, but only the body is evidence for proper
        // nouns: titles and instructions capitalise ordinary words.
        let (source_text, tagger) = match passage.parse::<PassageOcr>() {
            Ok(p) => (p.full_text(), LexiconTagger::from_text(&p.text)),
            Err(e) => {
                warn!("{}: {}; filtering the whole reply", ocr_task, e);
                let text = passage.as_str().to_string();
                let tagger = LexiconTagger::from_text(&text);
                (text, tagger)
            }
        };

        let words = filter_vocabulary_with(&source_text, &tagger);
        if words.is_empty() {
            return Err(run.malformed(ocr_task, RecoveryError::Empty));
        }
        info!("{} candidate words for vocabulary analysis", words.len());

        let task = TaskKind::VocabularyAnalysis;
        let reply = run
            .stage(
                task,
                vocabulary_payload(&words.to_prompt_literal()),
                None,
                NormalizeMode::Standard,
            )
            .await?;
        reply.parse().map_err(|e| run.malformed(task, e))
    }

    /// OCR a passage, a question sheet and an answer key, then ask the model
    /// to justify each answer against the passage.
    pub async fn run_comprehension(
        &self,
        passage: &str,
        questions: &str,
        answers: &str,
    ) -> Result<ChainOutput<ComprehensionReport>, ChainError> {
        let passage = self.load_image(passage).await?;
        let questions = self.load_image(questions).await?;
        let answers = self.load_image(answers).await?;

        let mut run = self.begin(4);
        let result = self
            .comprehension_stages(&mut run, [passage, questions, answers])
            .await;
        run.finish(result)
    }

    async fn comprehension_stages(
        &self,
        run: &mut Run<'_>,
        [passage, questions, answers]: [EncodedImage; 3],
    ) -> Result<ComprehensionReport, ChainError> {
        let mode = NormalizeMode::LineBreakMarkers;
        let mut extracted = Vec::with_capacity(3);
        for (task, image) in [
            (TaskKind::PassageOcr, passage),
            (TaskKind::QuestionOcr, questions),
            (TaskKind::AnswerOcr, answers),
        ] {
            let user = PromptTemplate::for_task(task).user.to_string();
            let text = run.stage(task, user, Some(image), mode).await?;
            extracted.push(text.into_string());
        }

        let task = TaskKind::ComprehensionReasoning;
        let text = format!(
            "{}{}",
            PromptTemplate::for_task(task).user,
            comprehension_payload(&extracted[0], &extracted[1], &extracted[2])
        );
        let reply = run.stage(task, text, None, mode).await?;
        reply.parse().map_err(|e| run.malformed(task, e))
    }

    /// Run a single OCR stage and validate the reply against that task's schema.
    pub async fn run_ocr(
        &self,
        task: TaskKind,
        image: &str,
    ) -> Result<ChainOutput<serde_json::Value>, ChainError> {
        if !task.needs_image() {
            return Err(ChainError::InvalidConfig(format!(
                "'{task}' is not an OCR task"
            )));
        }
        let encoded = self.load_image(image).await?;
        let mut run = self.begin(1);
        let result = self.ocr_stage(&mut run, task, encoded).await;
        run.finish(result)
    }

    async fn ocr_stage(
        &self,
        run: &mut Run<'_>,
        task: TaskKind,
        image: EncodedImage,
    ) -> Result<serde_json::Value, ChainError> {
        let mode = match task {
            TaskKind::StitchedPassageOcr => NormalizeMode::Standard,
            _ => NormalizeMode::LineBreakMarkers,
        };
        let user = PromptTemplate::for_task(task).user.to_string();
        let reply = run.stage(task, user, Some(image), mode).await?;
        let value = match task {
            TaskKind::PassageOcr => typed_value::<ParagraphExtraction>(&reply),
            TaskKind::StitchedPassageOcr => typed_value::<PassageOcr>(&reply),
            TaskKind::QuestionOcr => typed_value::<QuestionExtraction>(&reply),
            _ => typed_value::<AnswerExtraction>(&reply),
        };
        value.map_err(|e| run.malformed(task, e))
    }

    // ── Internals ───────────────────────────────────────────────────────────

    async fn load_image(&self, input: &str) -> Result<EncodedImage, ChainError> {
        let resolved = resolve_input(input, self.config.download_timeout_secs).await?;
        encode_image_file(resolved.path()).await
    }

    fn begin(&self, total: usize) -> Run<'_> {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_chain_start(total);
        }
        Run {
            controller: self,
            total,
            stages: Vec::with_capacity(total),
            waited: Duration::ZERO,
            started: Instant::now(),
            rejected: false,
        }
    }

    /// One stage with rate limiting and retry. Returns the reply and the
    /// number of retries it took.
    async fn call_with_retry(
        &self,
        request: &ModelRequest,
        waited: &mut Duration,
    ) -> Result<(ModelResponse, u32), ChainError> {
        let options = CallOptions::from(&self.config);
        let stage = request.task;
        let mut attempt = 0u32;

        loop {
            if let Some(ref limiter) = self.limiter {
                let wait = limiter.acquire().await;
                if !wait.is_zero() {
                    debug!("{}: rate limiter held the call for {:?}", stage, wait);
                    *waited += wait;
                    if let Some(ref cb) = self.config.progress_callback {
                        cb.on_stage_wait(stage, wait);
                    }
                }
            }

            let err = match self.client.invoke(request, &options).await {
                Ok(response) => return Ok((response, attempt)),
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= self.config.max_retries {
                warn!("{}: attempt {} failed — {}; giving up", stage, attempt + 1, err);
                return Err(ChainError::StageFailed {
                    stage,
                    attempts: attempt + 1,
                    source: err,
                });
            }

            attempt += 1;
            let hint = match err {
                ModelError::RateLimited {
                    retry_after_secs: Some(secs),
                } => Some(Duration::from_secs(secs)),
                _ => None,
            };
            let backoff = match (hint, self.limiter.as_ref()) {
                // The next acquire() waits out the hint; no extra sleep.
                (Some(hint), Some(limiter)) => {
                    limiter.defer(hint).await;
                    Duration::ZERO
                }
                (Some(hint), None) => self.config.backoff_for(attempt).max(hint),
                (None, _) => self.config.backoff_for(attempt),
            };

            warn!(
                "{}: attempt {} failed — {}; retry {}/{} after {:?}",
                stage,
                attempt,
                err,
                attempt,
                self.config.max_retries,
                hint.unwrap_or(backoff)
            );
            if !backoff.is_zero() {
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_stage_wait(stage, backoff);
                }
                sleep(backoff).await;
                *waited += backoff;
            }
        }
    }
}

fn typed_value<T: DeserializeOwned + Validate + Serialize>(
    text: &NormalizedText,
) -> Result<serde_json::Value, RecoveryError> {
    let parsed: T = text.parse()?;
    serde_json::to_value(parsed).map_err(|e| RecoveryError::SchemaMismatch {
        message: e.to_string(),
    })
}

/// Bookkeeping for one chain invocation.
struct Run<'a> {
    controller: &'a ChainController,
    total: usize,
    stages: Vec<StageResult>,
    waited: Duration,
    started: Instant,
    /// The last recorded reply was unusable, so its stage did not complete.
    rejected: bool,
}

impl Run<'_> {
    async fn stage(
        &mut self,
        task: TaskKind,
        text: String,
        image: Option<EncodedImage>,
        mode: NormalizeMode,
    ) -> Result<NormalizedText, ChainError> {
        let index = self.stages.len() + 1;
        let cb = self.controller.config.progress_callback.clone();
        if let Some(ref cb) = cb {
            cb.on_stage_start(task, index, self.total);
        }
        info!("Stage {}/{}: {}", index, self.total, task);

        let request = ModelRequest {
            task,
            system: PromptTemplate::for_task(task).system.to_string(),
            text,
            image,
        };
        debug!("{}: request text {} chars", task, request.text.len());

        let (response, retries) = match self
            .controller
            .call_with_retry(&request, &mut self.waited)
            .await
        {
            Ok(ok) => ok,
            Err(e) => {
                if let Some(ref cb) = cb {
                    cb.on_stage_error(task, index, self.total, &e.to_string());
                }
                return Err(e);
            }
        };

        let normalized = normalize_response(&response.content, mode);
        if let Some(ref cb) = cb {
            cb.on_stage_complete(task, index, self.total, normalized.as_str().len());
        }

        self.stages.push(StageResult {
            stage: task,
            raw: response.content,
            normalized: normalized.as_str().to_string(),
            diagnostics: normalized.diagnostics().to_vec(),
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            duration_ms: response.duration_ms,
            retries,
        });
        Ok(normalized)
    }

    /// Report an unusable reply from the most recent stage.
    fn malformed(&mut self, task: TaskKind, source: RecoveryError) -> ChainError {
        warn!("{}: unusable reply — {}", task, source);
        self.rejected = true;
        if let Some(ref cb) = self.controller.config.progress_callback {
            cb.on_stage_error(task, self.stages.len(), self.total, &source.to_string());
        }
        ChainError::MalformedResponse {
            stage: task,
            source,
        }
    }

    fn finish<T>(self, result: Result<T, ChainError>) -> Result<ChainOutput<T>, ChainError> {
        let completed = self.stages.len() - usize::from(self.rejected);
        let total_ms = self.started.elapsed().as_millis() as u64;
        if let Some(ref cb) = self.controller.config.progress_callback {
            cb.on_chain_complete(self.total, completed);
        }

        let payload = result?;
        let stats = ChainStats::from_stages(&self.stages, self.waited.as_millis() as u64, total_ms);
        info!(
            "Chain complete: {} stages, {} retries, {}ms total",
            stats.stages, stats.total_retries, stats.total_duration_ms
        );
        Ok(ChainOutput {
            payload,
            stages: self.stages,
            stats,
        })
    }
}
