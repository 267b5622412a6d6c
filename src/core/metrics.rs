//! Performance metrics for document processing and merging
//!
//! Atomic counters track how often documents are parsed and merged views are
//! built, and how long that takes. Metrics are only logged when the
//! MINISCRIPT_LSP_CACHE_STATS environment variable is set.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Cumulative processing metrics, safe to share between tasks.
#[derive(Debug, Default)]
pub struct AnalysisMetrics {
    parse_count: AtomicUsize,
    merge_count: AtomicUsize,
    total_parse_time_micros: AtomicU64,
    total_merge_time_micros: AtomicU64,
}

impl AnalysisMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one parse + analysis of a document.
    pub fn record_parse(&self, duration: Duration) {
        self.parse_count.fetch_add(1, Ordering::Relaxed);
        self.total_parse_time_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record one merged type view computed from scratch.
    pub fn record_merge(&self, duration: Duration) {
        self.merge_count.fetch_add(1, Ordering::Relaxed);
        self.total_merge_time_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Snapshot of the counters. Not atomic as a whole.
    pub fn get_stats(&self) -> AnalysisStats {
        let parse_count = self.parse_count.load(Ordering::Relaxed);
        let merge_count = self.merge_count.load(Ordering::Relaxed);
        let parse_time = self.total_parse_time_micros.load(Ordering::Relaxed);
        let merge_time = self.total_merge_time_micros.load(Ordering::Relaxed);

        AnalysisStats {
            parse_count,
            merge_count,
            avg_parse_time_ms: average_ms(parse_time, parse_count),
            avg_merge_time_ms: average_ms(merge_time, merge_count),
        }
    }

    pub fn maybe_log_stats(&self) {
        if std::env::var("MINISCRIPT_LSP_CACHE_STATS").is_ok() {
            let stats = self.get_stats();
            tracing::info!(
                "Analysis metrics: parses={} ({:.2}ms avg), merges={} ({:.2}ms avg)",
                stats.parse_count,
                stats.avg_parse_time_ms,
                stats.merge_count,
                stats.avg_merge_time_ms
            );
        }
    }
}

fn average_ms(total_micros: u64, count: usize) -> f64 {
    if count > 0 {
        (total_micros as f64 / count as f64) / 1000.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisStats {
    pub parse_count: usize,
    pub merge_count: usize,
    pub avg_parse_time_ms: f64,
    pub avg_merge_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        let stats = AnalysisMetrics::new().get_stats();
        assert_eq!(stats.parse_count, 0);
        assert_eq!(stats.merge_count, 0);
        assert_eq!(stats.avg_parse_time_ms, 0.0);
        assert_eq!(stats.avg_merge_time_ms, 0.0);
    }

    #[test]
    fn test_record_parse_and_merge() {
        let metrics = AnalysisMetrics::new();
        metrics.record_parse(Duration::from_micros(1000));
        metrics.record_parse(Duration::from_micros(2000));
        metrics.record_merge(Duration::from_micros(5000));

        let stats = metrics.get_stats();
        assert_eq!(stats.parse_count, 2);
        assert_eq!(stats.avg_parse_time_ms, 1.5);
        assert_eq!(stats.merge_count, 1);
        assert_eq!(stats.avg_merge_time_ms, 5.0);
    }
}
