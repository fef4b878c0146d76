use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;

/// Process-wide runtime counters for the collector.
///
/// Purpose:
/// - Track runs (started / completed / failed)
/// - Track upstream traffic (list calls / detail calls)
/// - Track throughput (records collected, batches and rows persisted)
///
/// Per-run call counts live in the run's `ResultAggregator`; these
/// counters accumulate across every run in the process.
///
/// Design:
/// - Lock-free (Atomics)
/// - Safe from worker threads and async tasks alike
#[derive(Default)]
pub struct RuntimeMetrics {
    // Runs
    pub runs_started: AtomicUsize,
    pub runs_completed: AtomicUsize,
    pub runs_failed: AtomicUsize,

    // Upstream
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub upstream_errors: AtomicUsize,

    // Throughput
    pub records_collected: AtomicUsize,
    pub batches_persisted: AtomicUsize,
    pub rows_written: AtomicUsize,
    pub persist_errors: AtomicUsize,
}

impl RuntimeMetrics {
    /// One-line summary in the `[METRICS]` log format.
    pub fn summary(&self) -> String {
        format!(
            "runs={} ok={} failed={} list={} detail={} upstream_err={} records={} batches={} rows={} persist_err={}",
            self.runs_started.load(Ordering::Relaxed),
            self.runs_completed.load(Ordering::Relaxed),
            self.runs_failed.load(Ordering::Relaxed),
            self.list_calls.load(Ordering::Relaxed),
            self.detail_calls.load(Ordering::Relaxed),
            self.upstream_errors.load(Ordering::Relaxed),
            self.records_collected.load(Ordering::Relaxed),
            self.batches_persisted.load(Ordering::Relaxed),
            self.rows_written.load(Ordering::Relaxed),
            self.persist_errors.load(Ordering::Relaxed),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
