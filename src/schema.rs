//! Typed payloads the model is asked to return, one per task.
//!
//! Models are loose about scalar types (`"group_number": 1` vs `"1"`, an
//! answer of `3` vs `"3"`), so text fields that commonly arrive as numbers
//! are deserialised leniently. Structural problems are not tolerated: a
//! missing required key or a list where a map is expected is a
//! [`crate::error::RecoveryError::SchemaMismatch`].

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Post-deserialisation checks serde cannot express.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

// ── OCR payloads ────────────────────────────────────────────────────────────

/// Passage page OCR (`{"paragraphs": ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphExtraction {
    #[serde(deserialize_with = "text_or_list")]
    pub paragraphs: String,
}

impl Validate for ParagraphExtraction {
    fn validate(&self) -> Result<(), String> {
        non_empty("paragraphs", &self.paragraphs)
    }
}

/// Stitched IELTS passage OCR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassageOcr {
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(deserialize_with = "text_or_list")]
    pub text: String,
}

impl PassageOcr {
    /// Every present field joined as prose, skipping the model's "None" placeholders.
    pub fn full_text(&self) -> String {
        [
            self.instructions.as_deref(),
            self.title.as_deref(),
            self.subtitle.as_deref(),
            Some(self.text.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
        .collect::<Vec<_>>()
        .join("\n")
    }
}

impl Validate for PassageOcr {
    fn validate(&self) -> Result<(), String> {
        non_empty("text", &self.text)
    }
}

/// Question sheet OCR (`{"Questions": {"1": ..., ...}}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionExtraction {
    #[serde(rename = "Questions", alias = "questions", deserialize_with = "lenient_map")]
    pub questions: BTreeMap<String, String>,
}

impl Validate for QuestionExtraction {
    fn validate(&self) -> Result<(), String> {
        non_empty_map("Questions", &self.questions)
    }
}

/// Answer key OCR (`{"1": ..., "2": ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerExtraction(#[serde(deserialize_with = "lenient_map")] pub BTreeMap<String, String>);

impl AnswerExtraction {
    /// Entries ordered by numeric index ("2" before "10"), non-numeric keys last.
    pub fn ordered(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> =
            self.0.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        entries.sort_by_key(|(k, _)| (k.parse::<u64>().unwrap_or(u64::MAX), k.to_string()));
        entries
    }
}

impl Validate for AnswerExtraction {
    fn validate(&self) -> Result<(), String> {
        non_empty_map("answers", &self.0)
    }
}

// ── Analysis payloads ───────────────────────────────────────────────────────

/// Vocabulary grouping returned by the analysis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyAnalysis {
    pub groups: Vec<VocabGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabGroup {
    #[serde(deserialize_with = "lenient_text")]
    pub group_number: String,
    pub words: Vec<VocabWord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabWord {
    pub word: String,
    pub meaning: String,
    #[serde(default)]
    pub formal_writing_sentence: String,
    #[serde(default)]
    pub semi_formal_speaking_sentence: String,
}

impl VocabularyAnalysis {
    pub fn word_count(&self) -> usize {
        self.groups.iter().map(|g| g.words.len()).sum()
    }
}

impl Validate for VocabularyAnalysis {
    fn validate(&self) -> Result<(), String> {
        if self.groups.is_empty() {
            return Err("groups: expected at least one group".into());
        }
        for group in &self.groups {
            if group.words.is_empty() {
                return Err(format!("group {}: no words", group.group_number));
            }
            for w in &group.words {
                non_empty("word", &w.word)
                    .and_then(|_| non_empty(&format!("meaning of '{}'", w.word), &w.meaning))?;
            }
        }
        Ok(())
    }
}

/// Per-question reasoning returned by the comprehension call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComprehensionReport {
    pub answers: BTreeMap<String, AnswerReasoning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerReasoning {
    #[serde(deserialize_with = "lenient_text")]
    pub answer: String,
    pub reasoning: String,
    #[serde(default)]
    pub location: String,
}

impl Validate for ComprehensionReport {
    fn validate(&self) -> Result<(), String> {
        if self.answers.is_empty() {
            return Err("answers: expected at least one entry".into());
        }
        for (index, a) in &self.answers {
            non_empty(&format!("reasoning for {index}"), &a.reasoning)?;
        }
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field}: must not be empty"))
    } else {
        Ok(())
    }
}

fn non_empty_map(field: &str, map: &BTreeMap<String, String>) -> Result<(), String> {
    if map.is_empty() {
        Err(format!("{field}: expected at least one entry"))
    } else {
        Ok(())
    }
}

fn scalar_to_text(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Value::deserialize(d)?;
    let shown = v.to_string();
    scalar_to_text(v).ok_or_else(|| de::Error::custom(format!("expected text, found {shown}")))
}

fn text_or_list<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::Array(items) => {
            let parts: Option<Vec<String>> = items.into_iter().map(scalar_to_text).collect();
            parts
                .map(|p| p.join("\n\n"))
                .ok_or_else(|| de::Error::custom("expected a list of text"))
        }
        v => {
            let shown = v.to_string();
            scalar_to_text(v)
                .ok_or_else(|| de::Error::custom(format!("expected text, found {shown}")))
        }
    }
}

fn lenient_map<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, String>, D::Error> {
    BTreeMap::<String, Value>::deserialize(d)?
        .into_iter()
        .map(|(k, v)| {
            let shown = v.to_string();
            scalar_to_text(v)
                .map(|text| (k.clone(), text))
                .ok_or_else(|| de::Error::custom(format!("entry {k}: expected text, found {shown}")))
        })
        .collect()
}
