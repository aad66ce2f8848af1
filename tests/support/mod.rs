//! Shared helpers for integration tests: a canned-reply model client and
//! throwaway image files.

#![allow(dead_code)]

use async_trait::async_trait;
use scan2json::{
    CallOptions, ChainConfig, ModelClient, ModelError, ModelRequest, ModelResponse, TaskKind,
};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

pub const PASSAGE_REPLY: &str = r#"Here is the extracted passage:
```json
{
  "instructions": "You should spend about 20 minutes on Questions 1-13.",
  "title": "The Secret Life of Honeybees",
  "subtitle": "None",
  "text": "Honeybees communicate through an elaborate dance. In 1973 Karl von Frisch shared a prize for decoding it. Foragers returning to the hive perform a waggle that conveys distance and direction."
}
```"#;

pub const VOCAB_REPLY: &str = r#"```json
{
  "groups": [
    {
      "group_number": 1,
      "words": [
        {
          "word": "elaborate",
          "meaning": "detailed and complicated",
          "formal_writing_sentence": "The committee drafted an elaborate proposal.",
          "semi_formal_speaking_sentence": "She planned a pretty elaborate party."
        },
        {
          "word": "convey",
          "meaning": "to communicate an idea",
          "formal_writing_sentence": "The chart conveys a clear trend.",
          "semi_formal_speaking_sentence": "It's hard to convey how tired I was."
        }
      ]
    }
  ]
}
```"#;

/// Answers each task with a fixed reply and records the requests it saw.
pub struct StubClient {
    replies: HashMap<TaskKind, Result<String, ModelError>>,
    pub seen: Mutex<Vec<ModelRequest>>,
}

impl StubClient {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn vocabulary() -> Self {
        Self::new()
            .reply(TaskKind::StitchedPassageOcr, PASSAGE_REPLY)
            .reply(TaskKind::VocabularyAnalysis, VOCAB_REPLY)
    }

    pub fn reply(mut self, task: TaskKind, text: &str) -> Self {
        self.replies.insert(task, Ok(text.to_string()));
        self
    }

    pub fn fail(mut self, task: TaskKind, err: ModelError) -> Self {
        self.replies.insert(task, Err(err));
        self
    }

    pub fn calls(&self) -> Vec<TaskKind> {
        self.seen.lock().unwrap().iter().map(|r| r.task).collect()
    }
}

#[async_trait]
impl ModelClient for StubClient {
    fn name(&self) -> &str {
        "stub"
    }

    async fn invoke(
        &self,
        request: &ModelRequest,
        _options: &CallOptions,
    ) -> Result<ModelResponse, ModelError> {
        self.seen.lock().unwrap().push(request.clone());
        match self.replies.get(&request.task) {
            Some(Ok(text)) => Ok(ModelResponse {
                content: text.clone(),
                input_tokens: 100,
                output_tokens: text.len() / 4,
                duration_ms: 1,
            }),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ModelError::Failed {
                detail: format!("no reply scripted for {}", request.task),
            }),
        }
    }
}

/// Route library logs to the test harness; `RUST_LOG=scan2json=debug` to see them.
pub fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// No rate limiting, near-zero backoff.
pub fn fast_config() -> ChainConfig {
    init_logs();
    ChainConfig::builder()
        .rate_limit(None)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

pub fn image_file(suffix: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    f.write_all(b"\x89PNG\r\n\x1a\nnot a real image").unwrap();
    f
}
