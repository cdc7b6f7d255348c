//! Pipeline performance counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    decisions: AtomicU64,
    decision_micros: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    precomputed_hits: AtomicU64,
    timeouts: AtomicU64,
    failures: AtomicU64,
    batch_completed: AtomicU64,
    batch_attempted: AtomicU64,
    predictions_run: AtomicU64,
    predictions_dropped: AtomicU64,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub decisions: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub precomputed_hits: u64,
    pub timeouts: u64,
    pub failures: u64,
    pub predictions_run: u64,
    pub predictions_dropped: u64,
    pub cache_hit_rate: f64,
    pub average_decision_time_ms: f64,
    pub timeout_rate: f64,
    /// Completed / attempted over every parallel batch; 1.0 before any batch
    pub parallel_efficiency: f64,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl PipelineMetrics {
    pub fn record_decision(&self, elapsed: Duration) {
        self.decisions.fetch_add(1, Ordering::Relaxed);
        self.decision_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_precomputed_hit(&self) {
        self.precomputed_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, completed: usize, attempted: usize) {
        self.batch_completed
            .fetch_add(completed as u64, Ordering::Relaxed);
        self.batch_attempted
            .fetch_add(attempted as u64, Ordering::Relaxed);
    }

    pub fn record_prediction(&self) {
        self.predictions_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction_dropped(&self) {
        self.predictions_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let decisions = self.decisions.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let timeouts = self.timeouts.load(Ordering::Relaxed);
        let attempted = self.batch_attempted.load(Ordering::Relaxed);
        MetricsSnapshot {
            decisions,
            cache_hits: hits,
            cache_misses: misses,
            precomputed_hits: self.precomputed_hits.load(Ordering::Relaxed),
            timeouts,
            failures: self.failures.load(Ordering::Relaxed),
            predictions_run: self.predictions_run.load(Ordering::Relaxed),
            predictions_dropped: self.predictions_dropped.load(Ordering::Relaxed),
            cache_hit_rate: ratio(hits, hits + misses),
            average_decision_time_ms: ratio(self.decision_micros.load(Ordering::Relaxed), decisions)
                / 1000.0,
            timeout_rate: ratio(timeouts, decisions),
            parallel_efficiency: if attempted == 0 {
                1.0
            } else {
                ratio(self.batch_completed.load(Ordering::Relaxed), attempted)
            },
        }
    }
}
