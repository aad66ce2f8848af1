//! Result types returned by the chain controller.

use crate::pipeline::normalize::Diagnostic;
use crate::prompts::TaskKind;
use serde::{Deserialize, Serialize};

/// Record of one completed model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: TaskKind,
    /// Completion text exactly as the provider returned it.
    pub raw: String,
    /// Text after normalisation (what the next stage or the parser saw).
    pub normalized: String,
    /// Normaliser diagnostics, e.g. "no JSON object found".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Retries spent before the call succeeded.
    pub retries: u32,
}

/// Aggregate counters for one chain run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainStats {
    pub stages: usize,
    pub total_retries: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Time spent waiting on the rate limiter and retry backoff.
    pub waited_ms: u64,
    pub total_duration_ms: u64,
}

impl ChainStats {
    pub(crate) fn from_stages(stages: &[StageResult], waited_ms: u64, total_duration_ms: u64) -> Self {
        Self {
            stages: stages.len(),
            total_retries: stages.iter().map(|s| s.retries).sum(),
            total_input_tokens: stages.iter().map(|s| s.input_tokens as u64).sum(),
            total_output_tokens: stages.iter().map(|s| s.output_tokens as u64).sum(),
            waited_ms,
            total_duration_ms,
        }
    }
}

/// The validated payload of a chain plus everything that led to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOutput<T> {
    pub payload: T,
    pub stages: Vec<StageResult>,
    pub stats: ChainStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(retries: u32, input: usize, output: usize) -> StageResult {
        StageResult {
            stage: TaskKind::AnswerOcr,
            raw: String::new(),
            normalized: String::new(),
            diagnostics: vec![],
            input_tokens: input,
            output_tokens: output,
            duration_ms: 1,
            retries,
        }
    }

    #[test]
    fn stats_sum_over_stages() {
        let stats = ChainStats::from_stages(&[stage(1, 100, 20), stage(0, 50, 5)], 10_000, 12_000);
        assert_eq!(stats.stages, 2);
        assert_eq!(stats.total_retries, 1);
        assert_eq!(stats.total_input_tokens, 150);
        assert_eq!(stats.total_output_tokens, 25);
        assert_eq!(stats.waited_ms, 10_000);
    }

    #[test]
    fn empty_diagnostics_are_not_serialised() {
        let json = serde_json::to_value(stage(0, 1, 1)).unwrap();
        assert!(json.get("diagnostics").is_none());
        assert_eq!(json["stage"], "answer-ocr");
    }
}
