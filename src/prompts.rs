//! Prompt templates for every extraction and analysis task.
//!
//! Every instruction the crate sends lives here so that a prompt change is a
//! one-file edit, and so unit tests can inspect prompts without a model.
//! Templates are selected by [`TaskKind`] and never mutated; dynamic content
//! (prior-stage output, candidate word lists) is appended by the helper
//! functions at the bottom of this module.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator placed between the three comprehension inputs.
pub const SECTION_SEPARATOR: &str = "<===>";

/// Every call the chain knows how to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// OCR of a passage page into `{"paragraphs": ...}`.
    PassageOcr,
    /// OCR of a vertically stitched IELTS passage into title/subtitle/text.
    StitchedPassageOcr,
    /// OCR of a question sheet into numbered questions.
    QuestionOcr,
    /// OCR of an answer key into numbered answers.
    AnswerOcr,
    /// Text-only: group candidate words by meaning.
    VocabularyAnalysis,
    /// Text-only: justify each answer against the passage.
    ComprehensionReasoning,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::PassageOcr,
        TaskKind::StitchedPassageOcr,
        TaskKind::QuestionOcr,
        TaskKind::AnswerOcr,
        TaskKind::VocabularyAnalysis,
        TaskKind::ComprehensionReasoning,
    ];

    /// Kebab-case identifier used in logs, errors and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::PassageOcr => "passage-ocr",
            TaskKind::StitchedPassageOcr => "stitched-passage-ocr",
            TaskKind::QuestionOcr => "question-ocr",
            TaskKind::AnswerOcr => "answer-ocr",
            TaskKind::VocabularyAnalysis => "vocabulary-analysis",
            TaskKind::ComprehensionReasoning => "comprehension-reasoning",
        }
    }

    /// OCR tasks carry an image; analysis tasks are text-only.
    pub fn needs_image(&self) -> bool {
        matches!(
            self,
            TaskKind::PassageOcr
                | TaskKind::StitchedPassageOcr
                | TaskKind::QuestionOcr
                | TaskKind::AnswerOcr
        )
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable (system, user) instruction pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    /// Return the fixed template for `kind`.
    pub fn for_task(kind: TaskKind) -> Self {
        match kind {
            TaskKind::PassageOcr => Self {
                system: OCR_SYSTEM_PROMPT,
                user: PASSAGE_OCR_PROMPT,
            },
            TaskKind::StitchedPassageOcr => Self {
                system: OCR_SYSTEM_PROMPT,
                user: STITCHED_PASSAGE_OCR_PROMPT,
            },
            TaskKind::QuestionOcr => Self {
                system: OCR_SYSTEM_PROMPT,
                user: QUESTION_OCR_PROMPT,
            },
            TaskKind::AnswerOcr => Self {
                system: OCR_SYSTEM_PROMPT,
                user: ANSWER_OCR_PROMPT,
            },
            TaskKind::VocabularyAnalysis => Self {
                system: VOCABULARY_SYSTEM_PROMPT,
                user: VOCABULARY_ANALYSIS_PROMPT,
            },
            TaskKind::ComprehensionReasoning => Self {
                system: OCR_SYSTEM_PROMPT,
                user: COMPREHENSION_REASONING_PROMPT,
            },
        }
    }
}

/// System prompt shared by all OCR calls and the comprehension call.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an expert in optical character recognition (OCR) and document analysis. Your job is to extract all the relevant text from any image provided, with special attention to format, headings, sub-headings, and body text. Be precise, follow the instructions strictly and return only the text that is present in the image and is asked from you."#;

pub const PASSAGE_OCR_PROMPT: &str = r#"You will be provided with image containing paragraphs. Your task is as follows:

Instructions:
1. Extract and return all paragraphs from the image.
2. Maintain the exact formatting as shown in the image.
3. Output strictly in JSON format.

Output format:
{
  "paragraphs": "<Extracted paragraph 1>"
}"#;

pub const STITCHED_PASSAGE_OCR_PROMPT: &str = r#"This is a complete vertically stacked image of multiple consecutive ordered pages of an IELTS reading passage. Your task is to carefully analyze the image and extract all the text from it. The passages are long, which is why the whole passage is given to you as one vertically stitched picture.

STRICT IMPORTANT NOTE: RETURN THE EXTRACTED DATA IN THE FORMAT GIVEN BELOW WITHOUT ANY EXPLANATIONS OR SUGGESTIONS. THE OUTPUT IS CONSUMED BY A PROGRAM.

Some visual cues to assist you in this process:
1- There are most probably instructions for the students at the start of the picture; extract those instructions too.
2- The largest and boldest text at the top of the picture is likely the title of the passage.
3- If a subtitle is present it is always below the main title. Sometimes the subtitle is absent.
4- Heading and subtitle are always relevant to each other and describe the overall idea of the main body.
5- Following the heading (and potential subtitle) is the main body of the passage. Keep the paragraph layout exactly as depicted and insert a '\n' (line break) at the start of every new paragraph. A paragraph may continue from one page onto the next; it is still one paragraph.
6- Official IELTS reading passages have 2000-3000 words in the main body.

Please deeply analyze the full text of the passage and return it in the following JSON format:
{
    "instructions": "Instruction by IELTS (if present otherwise write None)",
    "title": "Extracted Title Here",
    "subtitle": "Extracted Subtitle Here (if present otherwise write None)",
    "text": "Full text of the passage here."
}"#;

pub const QUESTION_OCR_PROMPT: &str = r#"You will be provided with image containing questions. Your task is as follows:

1. Identify Questions:
   - Identify the instructions and ignore them.
   - Extract only the questions, ignoring any instructions or rules given.
   - If a set of rules (e.g., "TRUE/FALSE/NOT GIVEN") is provided before the questions, exclude the rules and focus solely on the questions.
   - Identify each question type based on instructions given.
   - Strictly remove the instructions from output and fetch questions only

2. Numbering Questions:
   - Identify the index of each question, it mainly starts from 1.
   - Continue numbering sequentially across multiple images if questions span across multiple images.
   - Return the extracted text in the following JSON format without providing any explanation.

3. Output Format:

   {
    "Questions": {
    "1": "<Extracted question 1>",
    "2": "<Extracted question 2>",
    "...": "<Extracted question N>"
    }
   }"#;

pub const ANSWER_OCR_PROMPT: &str = r#"You will be provided with image containing solutions. Your task is as follows:

1. Identify Answers:
   - Extract only the answers starting from index 1 if given, ignoring any instructions or rules provided.

2. Numbering Answers:
   - Identify the index to each answers.
   - Continue numbering sequentially.
   - Return the extracted text in the following JSON format without providing any explanation.

3. Output Format:

   {
        "1": "<Extracted answer 1>",
        "2": "<Extracted answer 2>",
        "...": "<Extracted answer N>"
    }"#;

pub const COMPREHENSION_REASONING_PROMPT: &str = r#"You are an expert in text analysis and comprehension. You will be provided with a paragraph, a set of questions, and corresponding answers separated by "<===>". Your task is to analyze the provided text and fulfill the following requirements:

1. Extract the full paragraph and identify its structure, noting the specific locations of information (e.g., "paragraph 3, line 4").

2. For each question, provide:
   - The question index (e.g., 1, 2, 3, etc.).
   - The corresponding answer from the solution.
   - A clear and concise reasoning for why that specific answer was selected, referencing relevant parts of the paragraph.
   - The location of the relevant information in the paragraph (e.g., "paragraph 2, line 3").
   - Return the extracted text in the following JSON format:

3. Output Format:

{
  "answers": {
    "1": {
      "answer": "<Corresponding answer for question 1>",
      "reasoning": "<Reason for the answer based on the paragraph>",
      "location": "<Location in the paragraph (e.g., 'paragraph 2, line 3')>"
    },
    "...": {
      "answer": "<Corresponding answer for question N>",
      "reasoning": "<Reason for the answer based on the paragraph>",
      "location": "<Location in the paragraph (e.g., 'paragraph 4, line 2')>"
    }
  }
}
"#;

/// System prompt for the vocabulary-analysis call.
pub const VOCABULARY_SYSTEM_PROMPT: &str = r#"You are an expert english teacher. You know the grammar rules and have extensive depth in english literature. You have to analyze the given english words and teach them to students in a way that the meaning remains in their head. You are a great, professional, interactive and expert english teacher."#;

pub const VOCABULARY_ANALYSIS_PROMPT: &str = r#"You are an expert English teacher. You know about the grammar rules and have extensive knowledge of English literature. You have to analyze the given words in depth and find relations. Your goal is to provide a list of words that I can use in my IELTS English speaking and writing tasks to improve my vocabulary. Ignore the words in the array that cannot be used in conversations.

NOTE: YOU HAVE TO FOLLOW THE STRICT GUIDELINES GIVEN TO YOU AND RETURN THE REQUIRED ANSWER IN THE SPECIFIED FORMAT AT THE END OF THIS PROMPT. PROVIDE THE DATA IN JSON FORMAT, AND NOTHING ELSE. THE OUTPUT IS USED DIRECTLY BY A PROGRAM, SO IT MUST BE STRICTLY JSON.

Specifically, focus on these things:
1 - Group the words that have similar or closely related meanings, and ensure these words can be used in both English speaking and writing. Make at least 10 groups of words, each containing a maximum of 5 words or a minimum of 1.
2 - Generate a vivid meaning of each word that is relevant to the English dictionary.
3 - For speaking, group semi-formal words together.
4 - For writing, group formal words that can be used in formal English writing.
5 - Once the grouping of words is complete, craft two sentences for each word: one for formal academic writing and one for semi-formal speaking.
6 - Also, ensure that the two generated sentences for each word are linked together, so it is easy for students to grasp the meaning of the word and use it in different contexts.

In this way, students can learn more English words intuitively, and it will remain in their heads for a long time.

OUTPUT FORMAT:
Please return the data in JSON format with the following structure:

{
  "groups": [
    {
      "group_number": "<group_id>",
      "words": [
        {
          "word": "<word>",
          "meaning": "<meaning in English literature>",
          "formal_writing_sentence": "<formal academic sentence>",
          "semi_formal_speaking_sentence": "<semi-formal conversational sentence>"
        }
      ]
    }
  ]
}

ARRAY OF ENGLISH WORDS:"#;

/// Combine the three comprehension inputs into one text block.
pub fn comprehension_payload(paragraph: &str, questions: &str, answers: &str) -> String {
    format!(
        "Paragraph: {paragraph} {SECTION_SEPARATOR} Questions: {questions} {SECTION_SEPARATOR} Answers: {answers}"
    )
}

/// Append a rendered word list to the vocabulary-analysis instruction.
pub fn vocabulary_payload(word_list_literal: &str) -> String {
    format!("{VOCABULARY_ANALYSIS_PROMPT} {word_list_literal}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_task_has_a_non_empty_template() {
        for kind in TaskKind::ALL {
            let t = PromptTemplate::for_task(kind);
            assert!(!t.system.trim().is_empty(), "{kind}: empty system prompt");
            assert!(!t.user.trim().is_empty(), "{kind}: empty user prompt");
        }
    }

    #[test]
    fn vocabulary_uses_its_own_system_prompt() {
        let t = PromptTemplate::for_task(TaskKind::VocabularyAnalysis);
        assert_eq!(t.system, VOCABULARY_SYSTEM_PROMPT);
        assert!(t.user.ends_with("ARRAY OF ENGLISH WORDS:"));
    }

    #[test]
    fn comprehension_payload_has_two_separators() {
        let p = comprehension_payload("{\"paragraphs\": \"x\"}", "{\"Questions\": {}}", "{}");
        assert_eq!(p.matches(SECTION_SEPARATOR).count(), 2);
        assert!(p.starts_with("Paragraph: "));
        assert!(p.contains(" <===> Questions: "));
        assert!(p.contains(" <===> Answers: {}"));
    }

    #[test]
    fn vocabulary_payload_appends_literal() {
        let p = vocabulary_payload("['ample', 'vivid']");
        assert!(p.ends_with("ARRAY OF ENGLISH WORDS: ['ample', 'vivid']"));
    }

    #[test]
    fn only_ocr_tasks_need_images() {
        assert!(TaskKind::QuestionOcr.needs_image());
        assert!(TaskKind::StitchedPassageOcr.needs_image());
        assert!(!TaskKind::VocabularyAnalysis.needs_image());
        assert!(!TaskKind::ComprehensionReasoning.needs_image());
    }

    #[test]
    fn task_kind_serialises_kebab_case() {
        let s = serde_json::to_string(&TaskKind::ComprehensionReasoning).unwrap();
        assert_eq!(s, "\"comprehension-reasoning\"");
        assert_eq!(TaskKind::AnswerOcr.to_string(), "answer-ocr");
    }
}
