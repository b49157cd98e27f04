//! Run orchestration: the `Chunking -> Mapping -> Collapsing -> Finalizing -> Done` state
//! machine, with `Failed` reachable from every non-terminal state.
//!
//! A run owns its [`RunState`] exclusively. Summarizer calls are the only suspension points;
//! each stage is raced against the cancellation token so a cancel drops every in-flight call
//! and no further rounds start.

use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::summarization::Summarizer;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::chunking::{Chunker, apply_chunk_limit};
use super::collapse::Collapser;
use super::estimate::SizeEstimator;
use super::finalize::finalize;
use super::mapper::map_chunks;
use super::progress::{ProgressEvent, ProgressReporter};
use super::types::{
    AnalysisSection, Chunk, FinalSummary, PipelineConfig, PipelineError, PipelineState, Summary,
};

/// Mutable record of one run, discarded when the run ends.
struct RunState {
    state: PipelineState,
    chunks: Vec<Chunk>,
    dropped_chunks: usize,
    summaries: Vec<Summary>,
    collapsed_summaries: Vec<Summary>,
    sections: Vec<AnalysisSection>,
    round_count: u32,
    summarizer_calls: usize,
    final_summary: Option<String>,
}

impl RunState {
    fn new(sections: Vec<AnalysisSection>) -> Self {
        Self {
            state: PipelineState::Chunking,
            chunks: Vec::new(),
            dropped_chunks: 0,
            summaries: Vec::new(),
            collapsed_summaries: Vec::new(),
            sections,
            round_count: 0,
            summarizer_calls: 0,
            final_summary: None,
        }
    }

    fn enter(&mut self, state: PipelineState, progress: &ProgressReporter) {
        self.state = state;
        progress.emit(state, self.round_count);
    }
}

/// Map-reduce summarization pipeline.
///
/// Holds only immutable collaborators, so a single instance can serve concurrent runs; every
/// run gets its own state.
pub struct Pipeline {
    summarizer: Arc<dyn Summarizer>,
    estimator: SizeEstimator,
    metrics: PipelineMetrics,
}

impl Pipeline {
    /// Build a pipeline around a summarizer and a size estimator.
    pub fn new(summarizer: Arc<dyn Summarizer>, estimator: SizeEstimator) -> Self {
        Self {
            summarizer,
            estimator,
            metrics: PipelineMetrics::new(),
        }
    }

    /// Current counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Summarize `document` into one synthesis.
    ///
    /// `config` is validated before any work starts. Cancelling `cancel` aborts in-flight
    /// summarizer calls and fails the run with [`PipelineError::Cancelled`].
    pub async fn run(
        &self,
        document: &str,
        config: &PipelineConfig,
        sections: Vec<AnalysisSection>,
        cancel: &CancellationToken,
    ) -> Result<FinalSummary, PipelineError> {
        self.run_reporting(document, config, sections, cancel, ProgressReporter::default())
            .await
    }

    /// Like [`Pipeline::run`], additionally sending a [`ProgressEvent`] on every transition.
    pub async fn run_with_progress(
        &self,
        document: &str,
        config: &PipelineConfig,
        sections: Vec<AnalysisSection>,
        cancel: &CancellationToken,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<FinalSummary, PipelineError> {
        self.run_reporting(
            document,
            config,
            sections,
            cancel,
            ProgressReporter::new(Some(progress)),
        )
        .await
    }

    async fn run_reporting(
        &self,
        document: &str,
        config: &PipelineConfig,
        sections: Vec<AnalysisSection>,
        cancel: &CancellationToken,
        progress: ProgressReporter,
    ) -> Result<FinalSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("digest_run", %run_id);

        async move {
            tracing::info!(
                document_chars = document.chars().count(),
                sections = sections.len(),
                token_max = config.token_max,
                recursion_limit = config.recursion_limit,
                "Starting digest run"
            );
            self.metrics.record_run_started();

            let mut state = RunState::new(sections);
            let result = self.drive(&mut state, document, config, cancel, &progress).await;

            match &result {
                Ok(summary) => {
                    state.enter(PipelineState::Done, &progress);
                    self.metrics.record_run_completed(
                        summary.chunk_count as u64,
                        summary.dropped_chunks as u64,
                        u64::from(summary.rounds),
                        summary.summarizer_calls as u64,
                    );
                    tracing::info!(
                        chunks = summary.chunk_count,
                        dropped = summary.dropped_chunks,
                        rounds = summary.rounds,
                        summarizer_calls = summary.summarizer_calls,
                        "Digest run completed"
                    );
                }
                Err(error) => {
                    let failed_in = state.state;
                    state.round_count = progress.last_round();
                    state.enter(PipelineState::Failed, &progress);
                    if matches!(error, PipelineError::Cancelled { .. }) {
                        self.metrics.record_run_cancelled();
                        tracing::warn!(stage = %failed_in, "Digest run cancelled");
                    } else {
                        self.metrics.record_run_failed();
                        tracing::error!(
                            stage = %error.stage(),
                            round = state.round_count,
                            error = %error,
                            "Digest run failed"
                        );
                    }
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        state: &mut RunState,
        document: &str,
        config: &PipelineConfig,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<FinalSummary, PipelineError> {
        config.validate()?;
        let summarizer = self.summarizer.as_ref();

        state.enter(PipelineState::Chunking, progress);
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: PipelineState::Chunking,
            });
        }
        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap)?;
        let limited = apply_chunk_limit(
            chunker.chunks(document, &self.estimator)?,
            config.chunk_count_limit,
        );
        if limited.dropped > 0 {
            tracing::warn!(
                kept = limited.chunks.len(),
                dropped = limited.dropped,
                limit = config.chunk_count_limit,
                "Chunk count limit reached; trailing chunks dropped"
            );
        }
        state.chunks = limited.chunks;
        state.dropped_chunks = limited.dropped;

        state.enter(PipelineState::Mapping, progress);
        state.summaries = until_cancelled(
            cancel,
            PipelineState::Mapping,
            map_chunks(
                &state.chunks,
                summarizer,
                &self.estimator,
                config.map_concurrency,
            ),
        )
        .await?;
        state.summarizer_calls += state.summaries.len();

        state.enter(PipelineState::Collapsing, progress);
        let collapser = Collapser::new(
            summarizer,
            &self.estimator,
            config.token_max,
            config.recursion_limit,
            config.map_concurrency,
        );
        let outcome = until_cancelled(
            cancel,
            PipelineState::Collapsing,
            collapser.collapse_with_progress(state.summaries.clone(), progress),
        )
        .await?;
        state.round_count = outcome.rounds;
        state.summarizer_calls += outcome.merges;
        state.collapsed_summaries = outcome.summaries;

        state.enter(PipelineState::Finalizing, progress);
        let final_summary = until_cancelled(
            cancel,
            PipelineState::Finalizing,
            finalize(summarizer, &state.sections, &state.collapsed_summaries),
        )
        .await?;
        state.summarizer_calls += 1;
        state.final_summary = Some(final_summary.clone());

        Ok(FinalSummary {
            final_summary,
            chunk_count: state.chunks.len(),
            dropped_chunks: state.dropped_chunks,
            rounds: state.round_count,
            summarizer_calls: state.summarizer_calls,
        })
    }
}

/// Race one stage against the cancellation token. Losing the race drops the stage future,
/// which drops every summarizer call it has in flight.
async fn until_cancelled<T, F>(
    cancel: &CancellationToken,
    stage: PipelineState,
    work: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled { stage });
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage }),
        result = work => result,
    }
}
