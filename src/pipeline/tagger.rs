//! Part-of-speech tagging for the vocabulary filter.
//!
//! The filter only needs to know whether a token is a proper noun or a
//! cardinal number, so [`LexiconTagger`] answers exactly that from a small
//! number lexicon plus capitalisation evidence gathered from the source text
//! before it is lowercased. Anything smarter can be plugged in through
//! [`PosTagger`].

use crate::pipeline::stopwords::is_stopword;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartOfSpeech {
    ProperNoun,
    Cardinal,
    Other,
}

/// Tags a single lowercased, punctuation-free token.
pub trait PosTagger {
    fn tag(&self, token: &str) -> PartOfSpeech;
}

const NUMBER_WORDS: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    "hundred", "thousand", "million", "billion", "trillion", "dozen",
];

static NUMBER_LEXICON: Lazy<HashSet<&'static str>> =
    Lazy::new(|| NUMBER_WORDS.iter().copied().collect());

// Digits with an optional decade plural ("1990s").
static RE_NUMERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+s?$").unwrap());

static RE_NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Which tokens appear capitalised, and where, in the original text.
#[derive(Debug, Clone, Default)]
pub struct CaseEvidence {
    capitalised_mid_sentence: HashSet<String>,
    seen_lowercase: HashSet<String>,
}

impl CaseEvidence {
    /// Scan `text` line by line. The first word of a line and any word
    /// after `.`, `!`, `?` or `:` counts as sentence-initial. Title Case
    /// heading lines are skipped: they say nothing about proper nouns.
    pub fn from_text(text: &str) -> Self {
        let mut evidence = Self::default();
        for line in text.lines().filter(|l| !is_heading(l)) {
            let mut sentence_start = true;
            for raw in line.split_whitespace() {
                let cleaned = RE_NON_WORD.replace_all(raw, "");
                if let Some(first) = cleaned.chars().next() {
                    let key = cleaned.to_lowercase();
                    if first.is_uppercase() {
                        if !sentence_start {
                            evidence.capitalised_mid_sentence.insert(key);
                        }
                    } else {
                        evidence.seen_lowercase.insert(key);
                    }
                }
                sentence_start = ends_sentence(raw);
            }
        }
        evidence
    }

    /// Capitalised away from a sentence start and never seen lowercase.
    pub fn is_proper(&self, token: &str) -> bool {
        self.capitalised_mid_sentence.contains(token) && !self.seen_lowercase.contains(token)
    }
}

/// An unterminated line whose content words all start with a capital,
/// e.g. "The Secret Life of Honeybees".
fn is_heading(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || ends_sentence(line) {
        return false;
    }
    let mut capitalised = 0;
    for raw in line.split_whitespace() {
        let cleaned = RE_NON_WORD.replace_all(raw, "");
        let Some(first) = cleaned.chars().next() else {
            continue;
        };
        if first.is_uppercase() {
            capitalised += 1;
        } else if first.is_alphabetic() && !is_stopword(&cleaned.to_lowercase()) {
            return false;
        }
    }
    capitalised > 0
}

fn ends_sentence(raw: &str) -> bool {
    raw.trim_end_matches(|c: char| matches!(c, '"' | '\'' | ')' | ']' | '”' | '’'))
        .ends_with(['.', '!', '?', ':'])
}

/// Lexicon + capitalisation tagger.
#[derive(Debug, Clone, Default)]
pub struct LexiconTagger {
    evidence: CaseEvidence,
}

impl LexiconTagger {
    pub fn from_text(text: &str) -> Self {
        Self {
            evidence: CaseEvidence::from_text(text),
        }
    }
}

impl PosTagger for LexiconTagger {
    fn tag(&self, token: &str) -> PartOfSpeech {
        if RE_NUMERAL.is_match(token) || NUMBER_LEXICON.contains(token) {
            PartOfSpeech::Cardinal
        } else if self.evidence.is_proper(token) {
            PartOfSpeech::ProperNoun
        } else {
            PartOfSpeech::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_words_and_numerals_are_cardinal() {
        let tagger = LexiconTagger::default();
        for t in ["seven", "hundred", "dozen", "2020", "1990s"] {
            assert_eq!(tagger.tag(t), PartOfSpeech::Cardinal, "{t}");
        }
        assert_eq!(tagger.tag("3rd"), PartOfSpeech::Other);
    }

    #[test]
    fn mid_sentence_capital_is_proper() {
        let tagger = LexiconTagger::from_text("Bees were studied by Frisch in Munich.");
        assert_eq!(tagger.tag("frisch"), PartOfSpeech::ProperNoun);
        assert_eq!(tagger.tag("munich"), PartOfSpeech::ProperNoun);
        assert_eq!(tagger.tag("bees"), PartOfSpeech::Other);
    }

    #[test]
    fn lowercase_occurrence_vetoes_proper() {
        let tagger =
            LexiconTagger::from_text("The hive is warm. Workers leave the Hive at dawn, the hive empties.");
        assert_eq!(tagger.tag("hive"), PartOfSpeech::Other);
    }

    #[test]
    fn sentence_start_alone_is_not_proper() {
        let tagger = LexiconTagger::from_text("Migration is seasonal. Herds move north!\nRivers swell.");
        assert_eq!(tagger.tag("migration"), PartOfSpeech::Other);
        assert_eq!(tagger.tag("herds"), PartOfSpeech::Other);
        assert_eq!(tagger.tag("rivers"), PartOfSpeech::Other);
    }

    #[test]
    fn title_case_heading_is_not_evidence() {
        let tagger = LexiconTagger::from_text(
            "The Secret Life of Honeybees\nHoneybees dance. Karl von Frisch decoded it.",
        );
        for t in ["secret", "life", "honeybees"] {
            assert_eq!(tagger.tag(t), PartOfSpeech::Other, "{t}");
        }
        assert_eq!(tagger.tag("karl"), PartOfSpeech::ProperNoun);
        assert_eq!(tagger.tag("frisch"), PartOfSpeech::ProperNoun);
    }

    #[test]
    fn heading_detection() {
        assert!(is_heading("The Secret Life of Honeybees"));
        assert!(is_heading("  Rise and Fall of the 1990s Economy "));
        assert!(!is_heading("The secret life of honeybees"));
        assert!(!is_heading("Bees were studied by Frisch in Munich."));
        assert!(!is_heading(""));
    }

    #[test]
    fn quoted_sentence_end_is_recognised() {
        let evidence = CaseEvidence::from_text("He said \"stop.\" Nothing happened");
        assert!(!evidence.is_proper("nothing"));
    }
}
