//! Observable state-transition events.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc::UnboundedSender;

use super::types::PipelineState;

/// Emitted on every state transition of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// State the run just entered.
    pub state: PipelineState,
    /// Collapse rounds completed so far.
    pub round_count: u32,
}

/// Optional sink for [`ProgressEvent`]s. Sending never blocks and never fails the run.
///
/// Clones share the last reported round, so a stage that fails mid-collapse still leaves the
/// round it reached behind for the run to report.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProgressReporter {
    sender: Option<UnboundedSender<ProgressEvent>>,
    last_round: Arc<AtomicU32>,
}

impl ProgressReporter {
    pub(crate) fn new(sender: Option<UnboundedSender<ProgressEvent>>) -> Self {
        Self {
            sender,
            last_round: Arc::default(),
        }
    }

    pub(crate) fn emit(&self, state: PipelineState, round_count: u32) {
        tracing::debug!(state = %state, round_count, "Pipeline state transition");
        self.last_round.store(round_count, Ordering::Relaxed);
        if let Some(sender) = &self.sender {
            // A dropped receiver just means nobody is watching.
            let _ = sender.send(ProgressEvent { state, round_count });
        }
    }

    /// Round carried by the most recent event.
    pub(crate) fn last_round(&self) -> u32 {
        self.last_round.load(Ordering::Relaxed)
    }
}
