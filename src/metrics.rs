//! Scoring statistics for the upload service.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for scored uploads
pub struct ScoringMetrics {
    /// Uploads scored successfully
    pub uploads_scored: AtomicU64,
    /// Rows scored across all successful uploads
    pub rows_scored: AtomicU64,
    /// Rejected uploads by error kind
    rejections: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Stockout risk distribution buckets
    risk_buckets: RwLock<[u64; 10]>,
    /// Start time for uptime reporting
    start_time: Instant,
}

impl ScoringMetrics {
    pub fn new() -> Self {
        Self {
            uploads_scored: AtomicU64::new(0),
            rows_scored: AtomicU64::new(0),
            rejections: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            risk_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully scored upload
    pub fn record_upload(&self, processing_time: Duration, risks: impl IntoIterator<Item = f64>) {
        self.uploads_scored.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let mut rows = 0;
        if let Ok(mut buckets) = self.risk_buckets.write() {
            for risk in risks {
                let bucket = (risk * 10.0).clamp(0.0, 9.0) as usize;
                buckets[bucket] += 1;
                rows += 1;
            }
        }
        self.rows_scored.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record a rejected upload
    pub fn record_rejection(&self, kind: &str) {
        if let Ok(mut rejections) = self.rejections.write() {
            *rejections.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get stockout risk distribution
    pub fn get_risk_distribution(&self) -> [u64; 10] {
        self.risk_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Get rejected uploads by error kind
    pub fn get_rejections(&self) -> HashMap<String, u64> {
        self.rejections
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Point-in-time copy of every statistic
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            uploads_scored: self.uploads_scored.load(Ordering::Relaxed),
            rows_scored: self.rows_scored.load(Ordering::Relaxed),
            rejections: self.get_rejections(),
            processing: self.get_processing_stats(),
            risk_distribution: self.get_risk_distribution(),
        }
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let rejected: u64 = snapshot.rejections.values().sum();

        info!(
            uploads = snapshot.uploads_scored,
            rows = snapshot.rows_scored,
            rejected = rejected,
            uptime_secs = snapshot.uptime_secs,
            "Scoring summary"
        );
        info!(
            mean_us = snapshot.processing.mean_us,
            p50_us = snapshot.processing.p50_us,
            p95_us = snapshot.processing.p95_us,
            p99_us = snapshot.processing.p99_us,
            max_us = snapshot.processing.max_us,
            "Upload processing time"
        );
        for (kind, count) in &snapshot.rejections {
            info!(kind = %kind, count = count, "Rejected uploads");
        }

        let total: u64 = snapshot.risk_distribution.iter().sum();
        for (i, &count) in snapshot.risk_distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            info!(
                "Stockout risk {:.1}-{:.1}: {:>6} ({:>5.1}%)",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct
            );
        }
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Serializable copy of the metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub uploads_scored: u64,
    pub rows_scored: u64,
    pub rejections: HashMap<String, u64>,
    pub processing: ProcessingStats,
    pub risk_distribution: [u64; 10],
}

/// Periodic metrics reporter that logs summaries
pub struct MetricsReporter {
    metrics: Arc<ScoringMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ScoringMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
