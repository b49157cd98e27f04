//! Bounded, order-preserving fan-out of summarizer calls.

use crate::summarization::{Summarizer, SummarizerError, SummaryKind};
use futures_util::stream::{self, StreamExt};

/// A failed call together with the input position that produced it.
#[derive(Debug)]
pub(crate) struct FanoutError {
    pub(crate) index: usize,
    pub(crate) source: SummarizerError,
}

/// Summarize every input with at most `concurrency` calls in flight.
///
/// Calls complete in any order; outputs are written back by input position, so a successful
/// fan-out returns exactly one output per input. The first failure is returned immediately and
/// the remaining in-flight futures are dropped, aborting them.
pub(crate) async fn summarize_ordered(
    summarizer: &dyn Summarizer,
    kind: SummaryKind,
    inputs: Vec<String>,
    concurrency: usize,
) -> Result<Vec<String>, FanoutError> {
    let expected = inputs.len();
    let mut outputs = vec![String::new(); expected];
    let mut filled = 0usize;

    let mut pending = stream::iter(inputs.into_iter().enumerate())
        .map(move |(index, text)| async move {
            summarizer
                .summarize(kind, &text)
                .await
                .map(|output| (index, output))
                .map_err(|source| FanoutError { index, source })
        })
        .buffer_unordered(concurrency.max(1));

    while let Some(result) = pending.next().await {
        let (index, output) = result?;
        outputs[index] = output;
        filled += 1;
    }

    debug_assert_eq!(filled, expected, "every input position yields one output");
    Ok(outputs)
}
