//! Request metrics and periodic summaries for both services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for one service
pub struct ServiceMetrics {
    service: String,
    /// Requests that completed successfully
    pub requests_succeeded: AtomicU64,
    /// Requests that failed for any reason
    pub requests_failed: AtomicU64,
    /// Failures by reason
    failures_by_reason: RwLock<HashMap<String, u64>>,
    /// End-to-end processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Model inference times (in microseconds)
    model_times: RwLock<HashMap<String, Vec<u64>>>,
    /// How often each label was produced
    label_counts: RwLock<HashMap<String, u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    /// Create a new metrics collector for the named service
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            requests_succeeded: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            failures_by_reason: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            model_times: RwLock::new(HashMap::new()),
            label_counts: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a successful request
    pub fn record_success(&self, processing_time: Duration) {
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(processing_time);
    }

    /// Record a failed request
    pub fn record_failure(&self, reason: &str, processing_time: Duration) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(processing_time);

        if let Ok(mut by_reason) = self.failures_by_reason.write() {
            *by_reason.entry(reason.to_string()).or_insert(0) += 1;
        }
    }

    fn record_processing_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Record model inference time
    pub fn record_model_time(&self, model_name: &str, duration: Duration) {
        if let Ok(mut times) = self.model_times.write() {
            let model_times = times.entry(model_name.to_string()).or_default();
            model_times.push(duration.as_micros() as u64);
            // Keep only last 1000 per model
            if model_times.len() > 1000 {
                model_times.drain(0..500);
            }
        }
    }

    /// Count produced labels (predicted classes or detected tags)
    pub fn record_labels<I, S>(&self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Ok(mut counts) = self.label_counts.write() {
            for label in labels {
                *counts.entry(label.as_ref().to_string()).or_insert(0) += 1;
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = match self.processing_times.read() {
            Ok(times) => times,
            Err(_) => return ProcessingStats::default(),
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

    /// Get model performance stats
    pub fn get_model_stats(&self) -> HashMap<String, ModelStats> {
        let mut stats = HashMap::new();
        let times = match self.model_times.read() {
            Ok(times) => times,
            Err(_) => return stats,
        };

        for (model, model_times) in times.iter() {
            if model_times.is_empty() {
                continue;
            }

            let mut sorted: Vec<u64> = model_times.clone();
            sorted.sort_unstable();

            let sum: u64 = sorted.iter().sum();
            let count = sorted.len();

            stats.insert(
                model.clone(),
                ModelStats {
                    calls: count as u64,
                    mean_us: sum / count as u64,
                    p50_us: sorted[count / 2],
                    p99_us: sorted[(count as f64 * 0.99) as usize],
                },
            );
        }

        stats
    }

    /// Most frequent labels, highest count first (ties by name)
    pub fn top_labels(&self, n: usize) -> Vec<(String, u64)> {
        let mut labels: Vec<(String, u64)> = match self.label_counts.read() {
            Ok(counts) => counts.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            Err(_) => return Vec::new(),
        };
        labels.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        labels.truncate(n);
        labels
    }

    /// Get failures by reason
    pub fn get_failures_by_reason(&self) -> HashMap<String, u64> {
        self.failures_by_reason
            .read()
            .map(|by_reason| by_reason.clone())
            .unwrap_or_default()
    }

    /// Total requests seen
    pub fn total_requests(&self) -> u64 {
        self.requests_succeeded.load(Ordering::Relaxed)
            + self.requests_failed.load(Ordering::Relaxed)
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_requests() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let total = self.total_requests();
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let failure_rate = if total > 0 {
            (failed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();

        info!(
            service = %self.service,
            requests = total,
            failed = failed,
            failure_rate = format!("{:.1}%", failure_rate),
            throughput = format!("{:.2} req/s", self.get_throughput()),
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Metrics summary"
        );

        for (reason, count) in &self.get_failures_by_reason() {
            info!(service = %self.service, reason = %reason, count = count, "Failures by reason");
        }

        for (model, stats) in &self.get_model_stats() {
            info!(
                model = %model,
                calls = stats.calls,
                mean_us = stats.mean_us,
                p50_us = stats.p50_us,
                p99_us = stats.p99_us,
                "Model inference times"
            );
        }

        let top = self.top_labels(10);
        if !top.is_empty() {
            info!(service = %self.service, labels = ?top, "Most frequent labels");
        }
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Model-specific statistics
#[derive(Debug)]
pub struct ModelStats {
    pub calls: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task; returns immediately when disabled
    pub async fn start(self) {
        if self.interval_secs == 0 {
            return;
        }
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
