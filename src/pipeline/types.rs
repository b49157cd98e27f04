//! Core data types and error definitions for the digest pipeline.

use crate::summarization::SummarizerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use time::OffsetDateTime;

use super::estimate::SizeEstimator;

/// Ordered segment of the source document produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position of the chunk in the document.
    pub sequence_index: usize,
    /// Chunk contents, including any overlap shared with the previous chunk.
    pub text: String,
}

/// Provenance of a [`Summary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRef {
    /// Summary produced directly from a single chunk by the mapper.
    Chunk {
        /// Sequence index of the summarized chunk.
        sequence_index: usize,
    },
    /// Summary produced by merging a batch during a collapse round.
    Merged {
        /// Collapse round that produced the merge (starting at `1`).
        round: u32,
        /// Lowest chunk sequence index covered by the merged inputs.
        first_index: usize,
        /// Highest chunk sequence index covered by the merged inputs.
        last_index: usize,
    },
}

impl SourceRef {
    /// First chunk sequence index covered by this summary.
    pub fn sequence_index(&self) -> usize {
        match self {
            Self::Chunk { sequence_index } => *sequence_index,
            Self::Merged { first_index, .. } => *first_index,
        }
    }

    /// Last chunk sequence index covered by this summary.
    pub fn last_index(&self) -> usize {
        match self {
            Self::Chunk { sequence_index } => *sequence_index,
            Self::Merged { last_index, .. } => *last_index,
        }
    }
}

/// Compressed text for one chunk or for a merged batch of summaries.
///
/// `size` is the estimator's token-equivalent cost of `text`, captured once when the summary
/// is built so that budget decisions never touch the summarizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Where the summary came from.
    pub source_ref: SourceRef,
    /// Summary text.
    pub text: String,
    /// Estimated token cost of `text`.
    pub size: usize,
}

impl Summary {
    /// Build a summary, estimating its size with the supplied estimator.
    pub fn new(source_ref: SourceRef, text: String, estimator: &SizeEstimator) -> Self {
        let size = estimator.estimate(&text);
        Self {
            source_ref,
            text,
            size,
        }
    }
}

/// Total estimated size of a summary set.
pub fn total_size(summaries: &[Summary]) -> usize {
    summaries.iter().map(|summary| summary.size).sum()
}

/// Category attached to an externally produced analysis section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisCategory {
    /// Observations about layout, imagery, and visual hierarchy.
    Visual,
    /// Observations about copy and written content.
    Textual,
    /// Observations about interactive behavior.
    Functional,
}

impl AnalysisCategory {
    /// Fixed order in which categories are presented to the finalizer.
    pub const ALL: [AnalysisCategory; 3] = [Self::Visual, Self::Textual, Self::Functional];

    /// Lowercase identifier used in payloads and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visual => "visual",
            Self::Textual => "textual",
            Self::Functional => "functional",
        }
    }
}

impl fmt::Display for AnalysisCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category-tagged analysis supplied alongside the document and merged at finalize time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSection {
    /// Section category.
    pub category: AnalysisCategory,
    /// Analysis text.
    pub content: String,
    /// Creation timestamp; defaults to the moment the section was deserialized.
    #[serde(default = "now_utc", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AnalysisSection {
    /// Create a section stamped with the current UTC time.
    pub fn new(category: AnalysisCategory, content: impl Into<String>) -> Self {
        Self {
            category,
            content: content.into(),
            created_at: now_utc(),
        }
    }
}

fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Per-run tuning knobs. Immutable for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum cumulative summary size considered final.
    pub token_max: usize,
    /// Number of leading chunks kept after chunking; the rest are dropped.
    pub chunk_count_limit: usize,
    /// Maximum number of collapse rounds before the run is abandoned.
    pub recursion_limit: u32,
    /// Maximum chunk length in size-estimator tokens.
    pub chunk_size: usize,
    /// Tokens shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Maximum number of summarizer calls in flight during map and collapse rounds.
    pub map_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            token_max: 1000,
            chunk_count_limit: 10,
            recursion_limit: 10,
            chunk_size: 5000,
            chunk_overlap: 20,
            map_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |message: &str| Err(PipelineError::InvalidConfig(message.to_string()));
        if self.token_max == 0 {
            return invalid("token_max must be greater than zero");
        }
        if self.chunk_count_limit == 0 {
            return invalid("chunk_count_limit must be greater than zero");
        }
        if self.recursion_limit == 0 {
            return invalid("recursion_limit must be greater than zero");
        }
        if self.map_concurrency == 0 {
            return invalid("map_concurrency must be greater than zero");
        }
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize.into());
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                overlap: self.chunk_overlap,
                chunk_size: self.chunk_size,
            }
            .into());
        }
        Ok(())
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalSummary {
    /// Synthesis produced by the finalizer.
    pub final_summary: String,
    /// Chunks that were summarized.
    pub chunk_count: usize,
    /// Chunks discarded by `chunk_count_limit`.
    pub dropped_chunks: usize,
    /// Collapse rounds executed.
    pub rounds: u32,
    /// Total summarizer invocations across all stages.
    pub summarizer_calls: usize,
}

/// Pipeline state machine positions, also used to name the stage an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Splitting the document into chunks.
    Chunking,
    /// Summarizing each chunk.
    Mapping,
    /// Merging summaries until they fit the budget.
    Collapsing,
    /// Producing the final synthesis.
    Finalizing,
    /// Run finished successfully.
    Done,
    /// Run failed; terminal.
    Failed,
}

impl PipelineState {
    /// Lowercase identifier used in payloads and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunking => "chunking",
            Self::Mapping => "mapping",
            Self::Collapsing => "collapsing",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while splitting a document into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// The document was empty or whitespace only.
    #[error("document is empty")]
    EmptyInput,
    /// Chunking configured an impossible size budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would leave no room for new text in each chunk.
    #[error("chunk overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidOverlap {
        /// Requested overlap.
        overlap: usize,
        /// Requested chunk size.
        chunk_size: usize,
    },
}

/// Errors that terminate a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Run configuration failed validation.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
    /// The document contained no text to chunk.
    #[error("document is empty; nothing to summarize")]
    EmptyInput,
    /// The summarizer failed; carries the stage and, for collapse failures, the round.
    #[error("summarizer failed during {stage}{}: {source}", round_suffix(.round))]
    Summarizer {
        /// Stage that issued the failing call.
        stage: PipelineState,
        /// Collapse round, when the failure happened while collapsing.
        round: Option<u32>,
        /// Underlying capability error.
        #[source]
        source: SummarizerError,
    },
    /// Collapsing did not fit the budget within the recursion limit.
    #[error(
        "summaries still total {total_size} tokens after {rounds} collapse rounds (token_max {token_max})"
    )]
    CollapseBudgetExceeded {
        /// Rounds executed before giving up.
        rounds: u32,
        /// Remaining total size.
        total_size: usize,
        /// Configured budget.
        token_max: usize,
    },
    /// The finalizer received neither sections nor summaries.
    #[error("nothing to synthesize: no analysis sections and no summaries")]
    NoInput,
    /// The run was cancelled externally.
    #[error("run cancelled during {stage}")]
    Cancelled {
        /// Stage that was interrupted.
        stage: PipelineState,
    },
}

fn round_suffix(round: &Option<u32>) -> String {
    round
        .map(|value| format!(" (round {value})"))
        .unwrap_or_default()
}

impl PipelineError {
    /// Stage of the state machine the error originated from.
    pub fn stage(&self) -> PipelineState {
        match self {
            Self::InvalidConfig(_) | Self::EmptyInput => PipelineState::Chunking,
            Self::Summarizer { stage, .. } | Self::Cancelled { stage } => *stage,
            Self::CollapseBudgetExceeded { .. } => PipelineState::Collapsing,
            Self::NoInput => PipelineState::Finalizing,
        }
    }
}

impl From<ChunkingError> for PipelineError {
    fn from(error: ChunkingError) -> Self {
        match error {
            ChunkingError::EmptyInput => Self::EmptyInput,
            other => Self::InvalidConfig(other.to_string()),
        }
    }
}
