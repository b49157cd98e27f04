//! Map stage: one summary per chunk.

use crate::summarization::{Summarizer, SummaryKind};

use super::estimate::SizeEstimator;
use super::fanout::summarize_ordered;
use super::types::{Chunk, PipelineError, PipelineState, SourceRef, Summary};

/// Summarize every chunk with bounded concurrency, returning summaries in chunk order.
///
/// Fails fast: the first summarizer error fails the whole stage and no partial map set is
/// returned.
pub async fn map_chunks(
    chunks: &[Chunk],
    summarizer: &dyn Summarizer,
    estimator: &SizeEstimator,
    concurrency: usize,
) -> Result<Vec<Summary>, PipelineError> {
    let inputs: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    tracing::debug!(chunks = chunks.len(), concurrency, "Mapping chunks");

    let outputs = summarize_ordered(summarizer, SummaryKind::Map, inputs, concurrency)
        .await
        .map_err(|failure| {
            let sequence_index = chunks
                .get(failure.index)
                .map(|chunk| chunk.sequence_index)
                .unwrap_or(failure.index);
            tracing::error!(
                sequence_index,
                error = %failure.source,
                "Chunk summarization failed"
            );
            PipelineError::Summarizer {
                stage: PipelineState::Mapping,
                round: None,
                source: failure.source,
            }
        })?;

    Ok(chunks
        .iter()
        .zip(outputs)
        .map(|(chunk, text)| {
            Summary::new(
                SourceRef::Chunk {
                    sequence_index: chunk.sequence_index,
                },
                text,
                estimator,
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarization::SummarizerError;
    use async_trait::async_trait;

    struct Upper;

    #[async_trait]
    impl Summarizer for Upper {
        async fn summarize(&self, kind: SummaryKind, text: &str) -> Result<String, SummarizerError> {
            assert_eq!(kind, SummaryKind::Map);
            if text.contains("fail") {
                return Err(SummarizerError::ProviderUnavailable("offline".into()));
            }
            Ok(text.to_uppercase())
        }
    }

    fn chunk(sequence_index: usize, text: &str) -> Chunk {
        Chunk {
            sequence_index,
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn produces_one_sized_summary_per_chunk() {
        let chunks = vec![chunk(0, "alpha beta"), chunk(1, "gamma")];
        let summaries = map_chunks(&chunks, &Upper, &SizeEstimator::whitespace(), 2)
            .await
            .expect("map succeeds");

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].text, "ALPHA BETA");
        assert_eq!(summaries[0].size, 2);
        assert_eq!(
            summaries[1].source_ref,
            SourceRef::Chunk { sequence_index: 1 }
        );
    }

    #[tokio::test]
    async fn single_failure_fails_the_stage() {
        let chunks = vec![chunk(0, "ok"), chunk(1, "fail here"), chunk(2, "ok")];
        let error = map_chunks(&chunks, &Upper, &SizeEstimator::whitespace(), 1)
            .await
            .expect_err("map fails");
        assert!(matches!(
            error,
            PipelineError::Summarizer {
                stage: PipelineState::Mapping,
                round: None,
                source: SummarizerError::ProviderUnavailable(_),
            }
        ));
    }
}
