//! Lock free run counters shared by the delivery and flush loops

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::models::PipelineSummary;

#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    unsubscribed: AtomicU64,
    suppressed: AtomicU64,
    admitted: AtomicU64,
    unknown: AtomicU64,
    persisted: AtomicU64,
    flushes: AtomicU64,
    deadline_overruns: AtomicU64,
    sink_failures: AtomicU64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        bump(&self.received, 1);
    }

    pub(crate) fn record_unsubscribed(&self) {
        bump(&self.unsubscribed, 1);
    }

    pub(crate) fn record_suppressed(&self) {
        bump(&self.suppressed, 1);
    }

    pub(crate) fn record_admitted(&self) {
        bump(&self.admitted, 1);
    }

    pub(crate) fn record_unknown(&self) {
        bump(&self.unknown, 1);
    }

    pub(crate) fn record_flush(&self, persisted: usize) {
        bump(&self.flushes, 1);
        bump(&self.persisted, persisted as u64);
    }

    pub(crate) fn record_deadline_overrun(&self) {
        bump(&self.deadline_overruns, 1);
    }

    pub(crate) fn record_sink_failure(&self) {
        bump(&self.sink_failures, 1);
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    /// Point in time copy of every counter
    pub fn snapshot(&self, save_interval: f64, elapsed: Duration, interrupted: bool) -> PipelineSummary {
        PipelineSummary {
            received: self.received.load(Ordering::Relaxed),
            unsubscribed: self.unsubscribed.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            deadline_overruns: self.deadline_overruns.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            save_interval,
            duration_ms: elapsed.as_millis() as u64,
            interrupted: if interrupted { Some(true) } else { None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = PipelineStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_suppressed();
        stats.record_admitted();
        stats.record_flush(1);

        let summary = stats.snapshot(0.1, Duration::from_millis(42), false);
        assert_eq!(summary.received, 2);
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.admitted, 1);
        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.flushes, 1);
        assert_eq!(summary.duration_ms, 42);
        assert_eq!(summary.interrupted, None);

        let interrupted = stats.snapshot(0.1, Duration::ZERO, true);
        assert_eq!(interrupted.interrupted, Some(true));
    }
}
