use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    runs_cancelled: AtomicU64,
    chunks_mapped: AtomicU64,
    chunks_dropped: AtomicU64,
    collapse_rounds: AtomicU64,
    summarizer_calls: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a run has started.
    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful run and the work it performed.
    pub fn record_run_completed(
        &self,
        chunks_mapped: u64,
        chunks_dropped: u64,
        rounds: u64,
        summarizer_calls: u64,
    ) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.chunks_mapped
            .fetch_add(chunks_mapped, Ordering::Relaxed);
        self.chunks_dropped
            .fetch_add(chunks_dropped, Ordering::Relaxed);
        self.collapse_rounds.fetch_add(rounds, Ordering::Relaxed);
        self.summarizer_calls
            .fetch_add(summarizer_calls, Ordering::Relaxed);
    }

    /// Record a run that ended in failure.
    pub fn record_run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run that was cancelled before completion.
    pub fn record_run_cancelled(&self) {
        self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_cancelled: self.runs_cancelled.load(Ordering::Relaxed),
            chunks_mapped: self.chunks_mapped.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            collapse_rounds: self.collapse_rounds.load(Ordering::Relaxed),
            summarizer_calls: self.summarizer_calls.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Runs started since startup.
    pub runs_started: u64,
    /// Runs that produced a final summary.
    pub runs_completed: u64,
    /// Runs that failed for any reason other than cancellation.
    pub runs_failed: u64,
    /// Runs aborted by cancellation or timeout.
    pub runs_cancelled: u64,
    /// Chunks summarized by completed runs.
    pub chunks_mapped: u64,
    /// Chunks discarded by the chunk-count limit in completed runs.
    pub chunks_dropped: u64,
    /// Collapse rounds executed by completed runs.
    pub collapse_rounds: u64,
    /// Summarizer calls issued by completed runs.
    pub summarizer_calls: u64,
}
