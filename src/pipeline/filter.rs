//! Vocabulary filter: passage text → candidate word set.
//!
//! ```text
//! lowercase ─▶ strip punctuation ─▶ strip numerals ─▶ split
//!   ─▶ drop stopwords ─▶ tag ─▶ drop proper nouns / cardinals ─▶ dedupe
//! ```
//!
//! Capitalisation evidence for the tagger is taken from the text before it
//! is lowercased. Output is a sorted set so prompts render deterministically.

use crate::pipeline::stopwords::is_stopword;
use crate::pipeline::tagger::{LexiconTagger, PartOfSpeech, PosTagger};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

static RE_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static RE_STANDALONE_NUMERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+\b").unwrap());

/// Lowercase candidate words, deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateWordSet(BTreeSet<String>);

impl CandidateWordSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.0.contains(word)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Render as a list literal, `['ample', 'migration']`, for splicing into
    /// the vocabulary prompt.
    pub fn to_prompt_literal(&self) -> String {
        let quoted: Vec<String> = self.0.iter().map(|w| format!("'{w}'")).collect();
        format!("[{}]", quoted.join(", "))
    }

    /// Words joined by single spaces.
    pub fn joined(&self) -> String {
        self.iter().collect::<Vec<_>>().join(" ")
    }
}

impl FromIterator<String> for CandidateWordSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Filter `text` with the built-in [`LexiconTagger`].
pub fn filter_vocabulary(text: &str) -> CandidateWordSet {
    filter_vocabulary_with(text, &LexiconTagger::from_text(text))
}

/// Filter `text`, tagging surviving tokens with `tagger`.
pub fn filter_vocabulary_with(text: &str, tagger: &dyn PosTagger) -> CandidateWordSet {
    let lowered = text.to_lowercase();
    let no_punct = RE_PUNCTUATION.replace_all(&lowered, "");
    let no_numerals = RE_STANDALONE_NUMERAL.replace_all(&no_punct, "");

    let mut total = 0usize;
    let words: CandidateWordSet = no_numerals
        .split_whitespace()
        .inspect(|_| total += 1)
        .filter(|token| !is_stopword(token))
        .filter(|token| {
            !matches!(
                tagger.tag(token),
                PartOfSpeech::ProperNoun | PartOfSpeech::Cardinal
            )
        })
        .map(str::to_string)
        .collect();

    debug!("Vocabulary filter: {} tokens → {} candidates", total, words.len());
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numerals_are_dropped() {
        let words = filter_vocabulary("In 2020 the trend reversed sharply, after 3 decades.");
        assert!(words.iter().all(|w| !w.chars().all(|c| c.is_ascii_digit())));
        assert!(words.contains("trend"));
        assert!(words.contains("decades"));
    }

    #[test]
    fn stopwords_are_dropped() {
        let words = filter_vocabulary("The ant and the bee is busy.");
        for stop in ["the", "and", "is"] {
            assert!(!words.contains(stop), "{stop} leaked");
        }
        assert_eq!(words.to_prompt_literal(), "['ant', 'bee', 'busy']");
    }

    #[test]
    fn proper_nouns_and_number_words_are_dropped() {
        let words = filter_vocabulary("Scientists in Kenya counted seven hundred elephants.");
        assert!(!words.contains("kenya"));
        assert!(!words.contains("seven"));
        assert!(!words.contains("hundred"));
        assert!(words.contains("scientists"));
        assert!(words.contains("elephants"));
    }

    #[test]
    fn title_and_instruction_words_survive() {
        let body = "Honeybees communicate through an elaborate dance. In 1973 Karl von \
                    Frisch shared a prize for decoding it.";
        let text = format!(
            "You should spend about 20 minutes on Questions 1-13, which are based on \
             Reading Passage 1 below.\nThe Secret Life of Honeybees\n{body}"
        );
        let words = filter_vocabulary_with(&text, &LexiconTagger::from_text(body));
        for w in ["secret", "life", "honeybees", "questions", "reading", "passage", "elaborate"] {
            assert!(words.contains(w), "{w} dropped");
        }
        assert!(!words.contains("karl"));
        assert!(!words.contains("frisch"));
    }

    #[test]
    fn heading_line_is_not_proper_noun_evidence() {
        let words = filter_vocabulary("The Secret Life of Honeybees\nHoneybees dance for Karl.");
        assert!(words.contains("secret"));
        assert!(words.contains("life"));
        assert!(!words.contains("karl"));
    }

    #[test]
    fn duplicates_collapse() {
        let words = filter_vocabulary("Ample rain, ample harvest; AMPLE joy.");
        assert_eq!(words.iter().filter(|w| *w == "ample").count(), 1);
    }

    #[test]
    fn filter_is_idempotent() {
        let text = "Migration patterns shifted in 1998 when Dr. Okafor tracked \
                    forty herds across the Serengeti. The herds' routes were erratic!";
        let once = filter_vocabulary(text);
        let twice = filter_vocabulary(&once.joined());
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_text_renders_empty_literal() {
        let words = filter_vocabulary("  \n ");
        assert!(words.is_empty());
        assert_eq!(words.to_prompt_literal(), "[]");
    }

    #[test]
    fn custom_tagger_is_respected() {
        struct EverythingCardinal;
        impl PosTagger for EverythingCardinal {
            fn tag(&self, _: &str) -> PartOfSpeech {
                PartOfSpeech::Cardinal
            }
        }
        assert!(filter_vocabulary_with("ample harvest", &EverythingCardinal).is_empty());
    }
}
