//! Local token-cost estimation for chunks and summaries.
//!
//! Budget decisions in the collapser must never call the summarizer, so every [`super::Summary`]
//! carries a size computed here. Estimation prefers `tiktoken-rs` encodings (resolved from a
//! model name or an encoding name) and falls back to a whitespace word counter when a tokenizer
//! cannot be loaded.
//!
//! The same estimator also splits a document into pieces, one per token, which the chunker uses
//! as its window unit. Pieces are contiguous slices, so concatenating them yields the input.

use anyhow::Error as TokenizerError;
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;
type Segmenter = Arc<dyn Fn(&str) -> Vec<usize> + Send + Sync>;

/// Name accepted by [`SizeEstimator::for_model`] to select the whitespace counter.
pub const WHITESPACE_ESTIMATOR: &str = "whitespace";

/// Cheap, deterministic estimate of a text's token cost.
#[derive(Clone)]
pub struct SizeEstimator {
    name: String,
    counter: TokenCounter,
    segmenter: Segmenter,
}

impl SizeEstimator {
    /// Build an estimator for a model or encoding name.
    ///
    /// `whitespace` selects the word counter. Any other value is resolved as a tiktoken model,
    /// then as an encoding name, and finally falls back to `cl100k_base`. If the BPE tables fail
    /// to load the whitespace counter is used and the failure is logged at `warn`.
    pub fn for_model(model: &str) -> Self {
        let normalized = model.trim();
        if normalized.eq_ignore_ascii_case(WHITESPACE_ESTIMATOR) {
            return Self::whitespace();
        }
        let target = if normalized.is_empty() {
            "cl100k_base"
        } else {
            normalized
        };
        match resolve_encoding(target) {
            Ok(encoding) => {
                let encoding = Arc::new(encoding);
                let segmenting = Arc::clone(&encoding);
                Self {
                    name: target.to_string(),
                    counter: Arc::new(move |segment: &str| {
                        encoding.encode_ordinary(segment).len()
                    }),
                    segmenter: Arc::new(move |text: &str| token_boundaries(&segmenting, text)),
                }
            }
            Err(error) => {
                tracing::warn!(
                    model = target,
                    error = %error,
                    "Tokenizer unavailable; falling back to whitespace counter"
                );
                Self::whitespace()
            }
        }
    }

    /// Count whitespace-separated words; non-empty text always costs at least one.
    pub fn whitespace() -> Self {
        Self {
            name: WHITESPACE_ESTIMATOR.to_string(),
            counter: Arc::new(|segment: &str| {
                let tokens = segment.split_whitespace().count();
                if tokens == 0 && !segment.is_empty() {
                    1
                } else {
                    tokens
                }
            }),
            segmenter: Arc::new(word_boundaries),
        }
    }

    /// Wrap an arbitrary counting function. Useful for tests and custom tokenizers.
    ///
    /// Documents are split into one piece per character.
    pub fn from_fn<F>(name: impl Into<String>, counter: F) -> Self
    where
        F: Fn(&str) -> usize + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            counter: Arc::new(counter),
            segmenter: Arc::new(char_boundaries),
        }
    }

    /// Estimated token cost of `text`.
    pub fn estimate(&self, text: &str) -> usize {
        self.counter.as_ref()(text)
    }

    /// Byte offsets at which each piece of `text` ends, in order.
    ///
    /// The last offset is always `text.len()` for non-empty text, and `text[prev..end]` for
    /// consecutive offsets is one piece.
    pub fn piece_ends(&self, text: &str) -> Vec<usize> {
        self.segmenter.as_ref()(text)
    }

    /// Identifier of the underlying counter.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for SizeEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizeEstimator")
            .field("name", &self.name)
            .finish()
    }
}

/// One piece per BPE token. A token that ends inside a multi-byte character is merged with the
/// following token so every piece is valid UTF-8.
fn token_boundaries(encoding: &CoreBPE, text: &str) -> Vec<usize> {
    let tokens = encoding.encode_ordinary(text);
    let mut ends = Vec::with_capacity(tokens.len());
    let mut offset = 0usize;
    for bytes in encoding._decode_native_and_split(tokens) {
        offset += bytes.len();
        if offset >= text.len() {
            break;
        }
        if text.is_char_boundary(offset) {
            ends.push(offset);
        }
    }
    if !text.is_empty() {
        ends.push(text.len());
    }
    ends
}

/// One piece per word, each carrying its trailing whitespace; leading whitespace joins the first
/// word.
fn word_boundaries(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut seen_word = false;
    let mut in_word = false;
    for (offset, ch) in text.char_indices() {
        let is_space = ch.is_whitespace();
        if !is_space && !in_word && seen_word {
            ends.push(offset);
        }
        in_word = !is_space;
        seen_word |= in_word;
    }
    if !text.is_empty() {
        ends.push(text.len());
    }
    ends
}

fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(offset, ch)| offset + ch.len_utf8())
        .collect()
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::warn!(
                    model,
                    "Falling back to 'cl100k_base' encoding for size estimates"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}
