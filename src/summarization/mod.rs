//! The summarizer capability consumed by the digest pipeline, plus concrete adapters.
//!
//! The pipeline only sees the [`Summarizer`] trait. Two adapters ship with the crate: an
//! Ollama-backed client that issues HTTP requests directly to the runtime, and a deterministic
//! extractive summarizer that works offline and keeps the pipeline usable without a model.

mod extractive;
mod ollama;

pub use extractive::ExtractiveSummarizer;
pub use ollama::OllamaSummarizer;

use crate::config::{Config, SummarizationProvider};
use async_trait::async_trait;
use serde::Serialize;
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;

/// Errors surfaced by a summarizer.
#[derive(Debug, Error)]
pub enum SummarizerError {
    /// Provider was explicitly disabled or unreachable.
    #[error("Summarization provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate summary: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider did not answer within the configured timeout.
    #[error("Summarization timed out after {0:?}")]
    TimedOut(Duration),
}

/// Pipeline stage issuing a summarizer call.
///
/// Adapters may use this to pick instructions; the pipeline never depends on the choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    /// Summarize one document chunk.
    Map,
    /// Merge several summaries into one.
    Collapse,
    /// Produce the final synthesis from analysis sections and collapsed summaries.
    Final,
}

impl SummaryKind {
    /// Lowercase identifier used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::Collapse => "collapse",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text-to-text compression capability.
///
/// Implementations may fail or time out; retries, if any, belong inside the implementation.
/// Dropping the returned future must abort the underlying request.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `text` on behalf of the given pipeline stage.
    async fn summarize(&self, kind: SummaryKind, text: &str) -> Result<String, SummarizerError>;
}

/// Build the summarizer selected by configuration.
pub fn get_summarizer(config: &Config) -> Result<Arc<dyn Summarizer>, SummarizerError> {
    match config.summarization_provider {
        SummarizationProvider::Extractive => {
            tracing::info!(
                max_words = config.summarization_max_words,
                "Using extractive summarizer"
            );
            Ok(Arc::new(ExtractiveSummarizer::new(
                config.summarization_max_words,
            )))
        }
        SummarizationProvider::Ollama => {
            tracing::info!(
                url = %config.ollama_url,
                model = %config.summarization_model,
                "Using Ollama summarizer"
            );
            let client = OllamaSummarizer::new(
                config.ollama_url.clone(),
                config.summarization_model.clone(),
                config.summarization_max_words,
                config.summarization_timeout,
            )?;
            Ok(Arc::new(client))
        }
    }
}
