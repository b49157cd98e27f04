//! Deterministic extractive summarizer.
//!
//! Keeps the first sentence of each non-empty line until the word budget is spent. Output is
//! never longer than the input (modulo the ellipsis on truncated fallbacks), which makes it a
//! compressive stand-in for a model when none is configured.

use super::{Summarizer, SummarizerError, SummaryKind};
use async_trait::async_trait;

const MAX_SENTENCE_CHARS: usize = 180;
const MAX_FALLBACK_CHARS: usize = 200;

/// Offline summarizer built from leading sentences.
#[derive(Debug, Clone, Copy)]
pub struct ExtractiveSummarizer {
    max_words: usize,
}

impl ExtractiveSummarizer {
    /// Build a summarizer bounded by `max_words` (at least one word).
    pub fn new(max_words: usize) -> Self {
        Self {
            max_words: max_words.max(1),
        }
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, kind: SummaryKind, text: &str) -> Result<String, SummarizerError> {
        tracing::trace!(kind = %kind, max_words = self.max_words, "Extractive summary");
        Ok(build_extractive_summary(text, self.max_words))
    }
}

/// Collect leading sentences line by line, bounded by a word budget.
pub(crate) fn build_extractive_summary(text: &str, max_words: usize) -> String {
    let mut kept = Vec::new();
    let mut used_words = 0usize;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sentence = truncate_sentence(first_sentence(line), MAX_SENTENCE_CHARS);
        let sentence_words = count_words(&sentence);
        if sentence_words == 0 {
            continue;
        }
        if used_words + sentence_words > max_words {
            break;
        }
        used_words += sentence_words;
        kept.push(sentence);
        if used_words >= max_words {
            break;
        }
    }

    if kept.is_empty() {
        let Some(first_line) = text.lines().map(str::trim).find(|line| !line.is_empty()) else {
            return String::new();
        };
        let words: Vec<&str> = first_line.split_whitespace().take(max_words).collect();
        return truncate_sentence(&words.join(" "), MAX_FALLBACK_CHARS);
    }

    kept.join("\n")
}

fn first_sentence(text: &str) -> &str {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .find(|segment| !segment.is_empty())
        .unwrap_or(text)
}

fn truncate_sentence(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars - 1).collect::<String>();
    truncated.push('…');
    truncated
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
