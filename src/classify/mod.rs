//! Text classification of messages.
//!
//! The pipeline only sees the [`Classifier`] trait; [`GeminiClassifier`] is
//! the HTTP backend used by the binary.

mod gemini;

pub use gemini::GeminiClassifier;

use crate::error::ClassifyError;

/// Label used when the backend answers with no content at all.
pub const FALLBACK_LABEL: &str = "Other";

/// What the backend said about one message. `label` is free text and is not
/// guaranteed to be one of the configured categories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassificationResult {
    pub label: String,
    pub raw: Option<String>,
}

impl ClassificationResult {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            raw: None,
        }
    }
}

pub trait Classifier {
    /// `senders` is the comma joined sender list.
    fn classify(
        &mut self,
        subject: &str,
        senders: &str,
        body: &str,
    ) -> Result<ClassificationResult, ClassifyError>;
}

/// Instruction sent to text-generation backends.
pub fn build_prompt(categories: &[String], subject: &str, senders: &str, body: &str) -> String {
    format!(
        "Here is the subject of the letter, your task is to answer me in one word the type of this letter. \
         Available categories are: {}. Mail sender is: {}. The email subject is: {}. The email content is: {}",
        categories.join(", "),
        senders,
        subject,
        body
    )
}

/// Cuts `text` to at most `max_chars` characters, never splitting a char.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
