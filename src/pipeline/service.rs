//! Digest service shared by the HTTP surface and the CLI.

use crate::{
    config::Config,
    metrics::MetricsSnapshot,
    pipeline::{
        estimate::SizeEstimator,
        orchestrator::Pipeline,
        progress::ProgressEvent,
        types::{AnalysisSection, FinalSummary, PipelineConfig, PipelineError},
    },
    summarization::{Summarizer, SummarizerError, get_summarizer},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Per-request replacements for the service's default [`PipelineConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PipelineOverrides {
    /// Replacement `token_max`.
    #[serde(default)]
    pub token_max: Option<usize>,
    /// Replacement `chunk_count_limit`.
    #[serde(default)]
    pub chunk_count_limit: Option<usize>,
    /// Replacement `recursion_limit`.
    #[serde(default)]
    pub recursion_limit: Option<u32>,
    /// Replacement `chunk_size`.
    #[serde(default)]
    pub chunk_size: Option<usize>,
    /// Replacement `chunk_overlap`.
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
    /// Replacement `map_concurrency`.
    #[serde(default)]
    pub map_concurrency: Option<usize>,
}

impl PipelineOverrides {
    /// Merge the overrides over `base`.
    pub fn apply(&self, base: PipelineConfig) -> PipelineConfig {
        PipelineConfig {
            token_max: self.token_max.unwrap_or(base.token_max),
            chunk_count_limit: self.chunk_count_limit.unwrap_or(base.chunk_count_limit),
            recursion_limit: self.recursion_limit.unwrap_or(base.recursion_limit),
            chunk_size: self.chunk_size.unwrap_or(base.chunk_size),
            chunk_overlap: self.chunk_overlap.unwrap_or(base.chunk_overlap),
            map_concurrency: self.map_concurrency.unwrap_or(base.map_concurrency),
        }
    }
}

/// Abstraction over the digest pipeline used by external surfaces.
#[async_trait]
pub trait DigestApi: Send + Sync {
    /// Summarize a document, merging `sections` into the final synthesis.
    async fn summarize(
        &self,
        document: String,
        sections: Vec<AnalysisSection>,
        overrides: PipelineOverrides,
    ) -> Result<FinalSummary, PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the pipeline together with process-wide defaults.
///
/// Construct once near process start and share through an `Arc`.
pub struct DigestService {
    pipeline: Pipeline,
    defaults: PipelineConfig,
    run_timeout: Option<Duration>,
}

impl DigestService {
    /// Build a service from explicit parts.
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        estimator: SizeEstimator,
        defaults: PipelineConfig,
        run_timeout: Option<Duration>,
    ) -> Self {
        Self {
            pipeline: Pipeline::new(summarizer, estimator),
            defaults,
            run_timeout,
        }
    }

    /// Build a service using the configured summarizer, tokenizer and defaults.
    pub fn from_config(config: &Config) -> Result<Self, SummarizerError> {
        let summarizer = get_summarizer(config)?;
        let estimator = SizeEstimator::for_model(&config.tokenizer_model);
        tracing::info!(
            estimator = estimator.name(),
            token_max = config.pipeline.token_max,
            run_timeout_secs = config.run_timeout.map(|timeout| timeout.as_secs()),
            "Digest service initialized"
        );
        Ok(Self::new(
            summarizer,
            estimator,
            config.pipeline_config(),
            config.run_timeout,
        ))
    }

    /// Run the pipeline under a caller-owned token, optionally streaming progress.
    ///
    /// The configured run timeout cancels a child of `cancel`, so the caller's token is never
    /// triggered by the service. The timer lives inside the returned future and is dropped
    /// with it.
    pub async fn summarize_with(
        &self,
        document: &str,
        sections: Vec<AnalysisSection>,
        overrides: PipelineOverrides,
        cancel: &CancellationToken,
        progress: Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<FinalSummary, PipelineError> {
        let config = overrides.apply(self.defaults);
        let run_token = cancel.child_token();
        let run = async {
            match progress {
                Some(sender) => {
                    self.pipeline
                        .run_with_progress(document, &config, sections, &run_token, sender)
                        .await
                }
                None => {
                    self.pipeline
                        .run(document, &config, sections, &run_token)
                        .await
                }
            }
        };
        tokio::pin!(run);

        let Some(timeout) = self.run_timeout else {
            return run.await;
        };
        match tokio::time::timeout(timeout, &mut run).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "Run timeout elapsed; cancelling");
                run_token.cancel();
                // The run observes the token at its next suspension point and fails as cancelled.
                run.await
            }
        }
    }
}

#[async_trait]
impl DigestApi for DigestService {
    async fn summarize(
        &self,
        document: String,
        sections: Vec<AnalysisSection>,
        overrides: PipelineOverrides,
    ) -> Result<FinalSummary, PipelineError> {
        self.summarize_with(
            &document,
            sections,
            overrides,
            &CancellationToken::new(),
            None,
        )
        .await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.pipeline.metrics_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::PipelineState;
    use crate::summarization::{ExtractiveSummarizer, SummaryKind};

    struct Stalled;

    #[async_trait]
    impl Summarizer for Stalled {
        async fn summarize(&self, _kind: SummaryKind, _text: &str) -> Result<String, SummarizerError> {
            std::future::pending().await
        }
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let overrides = PipelineOverrides {
            token_max: Some(50),
            chunk_overlap: Some(0),
            ..PipelineOverrides::default()
        };
        let merged = overrides.apply(PipelineConfig::default());
        assert_eq!(merged.token_max, 50);
        assert_eq!(merged.chunk_overlap, 0);
        assert_eq!(merged.chunk_size, PipelineConfig::default().chunk_size);
        assert_eq!(merged.recursion_limit, PipelineConfig::default().recursion_limit);
    }

    #[test]
    fn overrides_deserialize_from_partial_json() {
        let overrides: PipelineOverrides =
            serde_json::from_str(r#"{"chunk_size": 120}"#).expect("overrides");
        assert_eq!(overrides.chunk_size, Some(120));
        assert!(overrides.token_max.is_none());
    }

    #[tokio::test]
    async fn extractive_service_summarizes_and_counts() {
        let service = DigestService::new(
            Arc::new(ExtractiveSummarizer::new(40)),
            SizeEstimator::whitespace(),
            PipelineConfig::default(),
            None,
        );

        let summary = service
            .summarize(
                "The launch went well. Several follow ups remain.".into(),
                Vec::new(),
                PipelineOverrides::default(),
            )
            .await
            .expect("summary");

        assert!(!summary.final_summary.is_empty());
        assert_eq!(summary.chunk_count, 1);
        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.runs_completed, 1);
        assert_eq!(snapshot.summarizer_calls, 2);
    }

    #[tokio::test]
    async fn run_timeout_cancels_without_touching_caller_token() {
        let service = DigestService::new(
            Arc::new(Stalled),
            SizeEstimator::whitespace(),
            PipelineConfig::default(),
            Some(Duration::from_millis(50)),
        );
        let caller = CancellationToken::new();

        let error = service
            .summarize_with("stuck", Vec::new(), PipelineOverrides::default(), &caller, None)
            .await
            .expect_err("timeout");

        assert!(matches!(
            error,
            PipelineError::Cancelled {
                stage: PipelineState::Mapping
            }
        ));
        assert!(!caller.is_cancelled());
        assert_eq!(service.metrics_snapshot().runs_cancelled, 1);
    }

    #[tokio::test]
    async fn abandoned_run_leaves_no_timer_behind() {
        let service = DigestService::new(
            Arc::new(Stalled),
            SizeEstimator::whitespace(),
            PipelineConfig::default(),
            Some(Duration::from_secs(60)),
        );
        let caller = CancellationToken::new();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            service.summarize_with("stuck", Vec::new(), PipelineOverrides::default(), &caller, None),
        )
        .await;

        assert!(abandoned.is_err(), "run should still be pending");
        assert_eq!(
            tokio::runtime::Handle::current()
                .metrics()
                .num_alive_tasks(),
            0
        );
        assert!(!caller.is_cancelled());
    }
}
