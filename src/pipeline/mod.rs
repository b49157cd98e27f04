//! Recursive map-reduce summarization pipeline.
//!
//! A document is split into overlapping chunks, each chunk is summarized, summaries are merged
//! in budget-bounded rounds until they fit `token_max`, and a final synthesis combines them
//! with externally supplied analysis sections.

pub mod chunking;
pub mod collapse;
pub mod estimate;
mod fanout;
pub mod finalize;
pub mod mapper;
pub mod orchestrator;
pub mod progress;
pub mod service;
pub mod types;

pub use chunking::{Chunker, LimitedChunks, apply_chunk_limit};
pub use collapse::{CollapseOutcome, Collapser, split_into_batches};
pub use estimate::SizeEstimator;
pub use finalize::{build_final_input, finalize};
pub use mapper::map_chunks;
pub use orchestrator::Pipeline;
pub use progress::ProgressEvent;
pub use service::{DigestApi, DigestService, PipelineOverrides};
pub use types::{
    AnalysisCategory, AnalysisSection, Chunk, ChunkingError, FinalSummary, PipelineConfig,
    PipelineError, PipelineState, SourceRef, Summary,
};
