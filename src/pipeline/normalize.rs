//! Response normalisation: pull the JSON payload out of a free-text reply.
//!
//! Even when told to answer "strictly in JSON", vision models wrap the
//! payload in ```` ```json ```` fences, add a sentence of prose before it, or
//! use Python-style single quotes. [`normalize_response`] applies five
//! deterministic rules to isolate the payload; [`NormalizedText::parse`] then
//! runs a small recovery parser and validates the result against a typed
//! schema.
//!
//! ## Rule Order
//!
//! 1. Strip newlines and the `json` / `bash` fence-language hints
//! 2. *(line-break-marker mode)* turn `<br>` into `\n`
//! 3. Two or more fences → take the text strictly between the first and last
//! 4. Otherwise first `{` to last `}` inclusive; no `{` → diagnostic, unchanged
//! 5. Replace `'` with `"`
//!
//! Rule 1 must precede rule 3 so the hint is not mistaken for payload, and
//! rule 2 must follow rule 1 so the newlines it inserts survive.
//!
//! ## Recovery parser failure modes
//!
//! | Error | When |
//! |-------|------|
//! | [`RecoveryError::Empty`] | nothing left after normalisation |
//! | [`RecoveryError::InvalidJson`] | neither the pre-quote nor the quote-normalised text parses, even after repair |
//! | [`RecoveryError::SchemaMismatch`] | valid JSON of the wrong shape, or a failed [`Validate`] check |

use crate::error::RecoveryError;
use crate::schema::Validate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

const FENCE: &str = "```";

/// Which rule set to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizeMode {
    /// Rules 1, 3, 4, 5.
    #[default]
    Standard,
    /// Also rule 2: `<br>` markers become newlines.
    LineBreakMarkers,
}

/// Something the normaliser noticed but could not fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnostic {
    /// No `{` anywhere; the text was left as is.
    NoJsonObject,
    /// A `{` without a later `}`; the text was left as is.
    UnclosedObject,
    /// A single fence with no partner; it was dropped.
    LoneFence,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Diagnostic::NoJsonObject => "No JSON found in the text",
            Diagnostic::UnclosedObject => "JSON object is never closed",
            Diagnostic::LoneFence => "Unpaired code fence removed",
        })
    }
}

/// Output of [`normalize_response`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    extracted: String,
    text: String,
    diagnostics: Vec<Diagnostic>,
}

impl NormalizedText {
    /// The normalised text (all five rules applied).
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The payload before quote substitution (rules 1–4).
    pub fn extracted(&self) -> &str {
        &self.extracted
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Parse into an untyped JSON value.
    ///
    /// Candidates are tried in order: the pre-quote extraction (so apostrophes
    /// inside strings survive), then the quote-normalised text (so
    /// `{'a': 'b'}` parses). Each is repaired first: raw control characters
    /// inside string literals are escaped and trailing commas are dropped.
    pub fn parse_value(&self) -> Result<serde_json::Value, RecoveryError> {
        if self.text.trim().is_empty() {
            return Err(RecoveryError::Empty);
        }

        let mut first_err: Option<serde_json::Error> = None;
        let candidates = [self.extracted.as_str(), self.text.as_str()];
        for (i, candidate) in candidates.iter().enumerate() {
            if i == 1 && candidates[0] == candidates[1] {
                break;
            }
            match serde_json::from_str(&repair_json(candidate)) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }

        Err(match first_err {
            Some(e) => RecoveryError::InvalidJson {
                line: e.line(),
                column: e.column(),
                message: e.to_string(),
            },
            None => RecoveryError::Empty,
        })
    }

    /// Parse and validate into a typed schema.
    pub fn parse<T: DeserializeOwned + Validate>(&self) -> Result<T, RecoveryError> {
        let value = self.parse_value()?;
        let parsed: T = serde_json::from_value(value).map_err(|e| RecoveryError::SchemaMismatch {
            message: e.to_string(),
        })?;
        parsed
            .validate()
            .map_err(|message| RecoveryError::SchemaMismatch { message })?;
        Ok(parsed)
    }
}

// ── Rule 1: newlines and fence-language hints ───────────────────────────────

static RE_FENCE_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```[ \t]*(?:json|bash)\b").unwrap());

fn strip_hints(input: &str) -> String {
    let s = input.replace(['\r', '\n'], "");
    RE_FENCE_HINT.replace_all(&s, FENCE).into_owned()
}

// ── Rule 2: line-break markers ──────────────────────────────────────────────

static RE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

fn expand_line_breaks(input: &str) -> String {
    RE_BR.replace_all(input, "\n").into_owned()
}

// ── Rules 3 + 4: fence or brace extraction ──────────────────────────────────

fn extract_payload(input: &str, diagnostics: &mut Vec<Diagnostic>) -> String {
    let fences = input.matches(FENCE).count();
    if fences >= 2 {
        // Both indices exist because there are at least two matches.
        let start = input.find(FENCE).unwrap_or(0) + FENCE.len();
        let end = input.rfind(FENCE).unwrap_or(input.len());
        return input[start..end].trim().to_string();
    }

    let unfenced;
    let s = if fences == 1 {
        warn!("{}", Diagnostic::LoneFence);
        diagnostics.push(Diagnostic::LoneFence);
        unfenced = input.replacen(FENCE, "", 1);
        unfenced.as_str()
    } else {
        input
    };

    match (s.find('{'), s.rfind('}')) {
        (Some(start), Some(end)) if end > start => s[start..=end].to_string(),
        (Some(_), _) => {
            warn!("{}", Diagnostic::UnclosedObject);
            diagnostics.push(Diagnostic::UnclosedObject);
            s.to_string()
        }
        (None, _) => {
            warn!("{}", Diagnostic::NoJsonObject);
            diagnostics.push(Diagnostic::NoJsonObject);
            s.to_string()
        }
    }
}

/// Apply the normalisation rules to a raw completion.
pub fn normalize_response(raw: &str, mode: NormalizeMode) -> NormalizedText {
    let mut diagnostics = Vec::new();
    let s = strip_hints(raw);
    let s = match mode {
        NormalizeMode::Standard => s,
        NormalizeMode::LineBreakMarkers => expand_line_breaks(&s),
    };
    let extracted = extract_payload(&s, &mut diagnostics);
    // Rule 5
    let text = extracted.replace('\'', "\"");

    NormalizedText {
        extracted,
        text,
        diagnostics,
    }
}

// ── Recovery repairs ────────────────────────────────────────────────────────

/// Escape control characters inside string literals and drop trailing commas.
fn repair_json(input: &str) -> String {
    let chars: Vec<char> = input.trim().chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            c => out.push(c),
        }
    }
    out
}

// ── Tests ───────────────────────────────────────────────────────────────────
