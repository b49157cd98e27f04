//! Ollama-backed summarizer issuing `POST /api/generate` requests.

use super::{Summarizer, SummarizerError, SummaryKind};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Summarizer that prompts a local Ollama runtime.
pub struct OllamaSummarizer {
    http: Client,
    base_url: String,
    model: String,
    max_words: usize,
    timeout: Duration,
}

impl OllamaSummarizer {
    /// Build a client for `base_url` using `model`, with a per-request timeout.
    pub fn new(
        base_url: String,
        model: String,
        max_words: usize,
        timeout: Duration,
    ) -> Result<Self, SummarizerError> {
        let http = Client::builder()
            .user_agent("rusty-digest/summary")
            .timeout(timeout)
            .build()
            .map_err(|error| {
                SummarizerError::ProviderUnavailable(format!(
                    "failed to construct HTTP client: {error}"
                ))
            })?;
        Ok(Self {
            http,
            base_url,
            model,
            max_words,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

/// Assemble the prompt for one stage. The instruction is kept short; the text follows verbatim.
fn build_prompt(kind: SummaryKind, text: &str, max_words: usize) -> String {
    let instruction = match kind {
        SummaryKind::Map => {
            "Summarize the following page content. Keep links, buttons, and notable interface elements with a short description."
        }
        SummaryKind::Collapse => {
            "Merge the following summaries into one consolidated summary. Remove repetition and keep every distinct fact."
        }
        SummaryKind::Final => {
            "Write the final synthesis of the page from the analyses and document summary below."
        }
    };
    format!("{instruction} Return at most {max_words} words.\n\n{text}")
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, kind: SummaryKind, text: &str) -> Result<String, SummarizerError> {
        let payload = json!({
            "model": self.model,
            "prompt": build_prompt(kind, text, self.max_words),
            "stream": false,
            "options": {
                "temperature": 0.2,
            }
        });

        tracing::trace!(kind = %kind, model = %self.model, "Requesting summary from Ollama");
        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    SummarizerError::TimedOut(self.timeout)
                } else {
                    SummarizerError::ProviderUnavailable(format!(
                        "failed to reach Ollama at {}: {error}",
                        self.base_url
                    ))
                }
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SummarizerError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizerError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                SummarizerError::TimedOut(self.timeout)
            } else {
                SummarizerError::InvalidResponse(format!(
                    "failed to decode Ollama response: {error}"
                ))
            }
        })?;

        if !body.done {
            return Err(SummarizerError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}
