//! Collapse stage: merge summaries in budget-bounded batches until they fit `token_max`.
//!
//! Each round performs a single greedy left-to-right scan to build contiguous batches, merges
//! every multi-member batch with one summarizer call, and publishes a complete new summary
//! list. Rounds repeat while the total size exceeds the budget, up to `recursion_limit` rounds.

use crate::summarization::{Summarizer, SummaryKind};

use super::estimate::SizeEstimator;
use super::fanout::summarize_ordered;
use super::progress::ProgressReporter;
use super::types::{PipelineError, PipelineState, SourceRef, Summary, total_size};

const MERGE_SEPARATOR: &str = "\n\n";

/// Contiguous run of summaries merged together in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    /// Members in document order.
    pub members: &'a [Summary],
    /// Sum of member sizes.
    pub size: usize,
}

impl Batch<'_> {
    /// Whether the batch needs a summarizer call.
    pub fn needs_merge(&self) -> bool {
        self.members.len() > 1
    }
}

/// Group summaries into contiguous batches whose size stays within `token_max`.
///
/// A summary joins the current batch while the running total stays `<= token_max`; otherwise
/// the batch is closed and a new one begins. A single summary larger than the budget always
/// forms its own batch. Order is never changed.
pub fn split_into_batches(summaries: &[Summary], token_max: usize) -> Vec<Batch<'_>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut size = 0usize;

    for (index, summary) in summaries.iter().enumerate() {
        if index > start && size + summary.size > token_max {
            batches.push(Batch {
                members: &summaries[start..index],
                size,
            });
            start = index;
            size = 0;
        }
        size += summary.size;
    }

    if start < summaries.len() {
        batches.push(Batch {
            members: &summaries[start..],
            size,
        });
    }

    batches
}

/// Outcome of a completed collapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapseOutcome {
    /// Summaries whose total size fits `token_max`, in document order.
    pub summaries: Vec<Summary>,
    /// Rounds executed.
    pub rounds: u32,
    /// Summarizer calls issued across all rounds.
    pub merges: usize,
}

/// Budget-driven recursive merger.
pub struct Collapser<'a> {
    summarizer: &'a dyn Summarizer,
    estimator: &'a SizeEstimator,
    token_max: usize,
    recursion_limit: u32,
    concurrency: usize,
}

impl<'a> Collapser<'a> {
    /// Build a collapser for one run.
    pub fn new(
        summarizer: &'a dyn Summarizer,
        estimator: &'a SizeEstimator,
        token_max: usize,
        recursion_limit: u32,
        concurrency: usize,
    ) -> Self {
        Self {
            summarizer,
            estimator,
            token_max,
            recursion_limit,
            concurrency,
        }
    }

    /// Collapse until the set fits the budget or the recursion limit is reached.
    pub async fn collapse(&self, summaries: Vec<Summary>) -> Result<CollapseOutcome, PipelineError> {
        self.collapse_with_progress(summaries, &ProgressReporter::default())
            .await
    }

    pub(crate) async fn collapse_with_progress(
        &self,
        summaries: Vec<Summary>,
        progress: &ProgressReporter,
    ) -> Result<CollapseOutcome, PipelineError> {
        let mut current = summaries;
        let mut rounds = 0u32;
        let mut merges = 0usize;

        loop {
            let total = total_size(&current);
            if total <= self.token_max {
                tracing::debug!(total, rounds, token_max = self.token_max, "Summaries fit budget");
                return Ok(CollapseOutcome {
                    summaries: current,
                    rounds,
                    merges,
                });
            }
            if rounds >= self.recursion_limit {
                tracing::error!(
                    total,
                    rounds,
                    token_max = self.token_max,
                    "Collapse recursion limit reached"
                );
                return Err(PipelineError::CollapseBudgetExceeded {
                    rounds,
                    total_size: total,
                    token_max: self.token_max,
                });
            }

            rounds += 1;
            progress.emit(PipelineState::Collapsing, rounds);
            let (next, merged) = self.collapse_round(&current, rounds).await?;
            if merged == 0 {
                tracing::warn!(
                    round = rounds,
                    total,
                    token_max = self.token_max,
                    "Collapse round made no progress; every batch holds a single summary"
                );
            }
            tracing::debug!(
                round = rounds,
                before = total,
                after = total_size(&next),
                merged,
                "Collapse round complete"
            );
            merges += merged;
            current = next;
        }
    }

    /// Run one round: batch, merge multi-member batches concurrently, and reassemble in order.
    ///
    /// Returns the new summary list and the number of summarizer calls made.
    pub async fn collapse_round(
        &self,
        summaries: &[Summary],
        round: u32,
    ) -> Result<(Vec<Summary>, usize), PipelineError> {
        let batches = split_into_batches(summaries, self.token_max);
        let inputs: Vec<String> = batches
            .iter()
            .filter(|batch| batch.needs_merge())
            .map(|batch| join_texts(batch.members))
            .collect();
        let merge_count = inputs.len();
        tracing::debug!(
            round,
            batches = batches.len(),
            merges = merge_count,
            "Collapsing batches"
        );

        let merged = summarize_ordered(
            self.summarizer,
            SummaryKind::Collapse,
            inputs,
            self.concurrency,
        )
        .await
        .map_err(|failure| {
            tracing::error!(round, batch = failure.index, error = %failure.source, "Batch merge failed");
            PipelineError::Summarizer {
                stage: PipelineState::Collapsing,
                round: Some(round),
                source: failure.source,
            }
        })?;

        debug_assert_eq!(merged.len(), merge_count);
        let mut merged = merged.into_iter();
        let mut next = Vec::with_capacity(batches.len());
        for batch in &batches {
            if !batch.needs_merge() {
                next.extend(batch.members.iter().cloned());
                continue;
            }
            let text = merged.next().unwrap_or_default();
            let first = &batch.members[0];
            let last = &batch.members[batch.members.len() - 1];
            next.push(Summary::new(
                SourceRef::Merged {
                    round,
                    first_index: first.source_ref.sequence_index(),
                    last_index: last.source_ref.last_index(),
                },
                text,
                self.estimator,
            ));
        }

        Ok((next, merge_count))
    }
}

fn join_texts(members: &[Summary]) -> String {
    members
        .iter()
        .map(|summary| summary.text.as_str())
        .collect::<Vec<_>>()
        .join(MERGE_SEPARATOR)
}
