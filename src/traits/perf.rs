use crate::observability::perf::PerfEvent;

/// Sink for per-frame timing records.
///
/// The pipeline calls `record` from worker threads while frames are in
/// flight, so implementations must be cheap and must not block for long.
pub trait PerfRecorder: Send + Sync {
    fn record(&self, event: PerfEvent);
}
