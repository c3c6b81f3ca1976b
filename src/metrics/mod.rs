//! Metrics and observability for the inference engine.
//!
//! Provides production-grade metrics collection including:
//! - Request throughput and latency (TTFT, tokens/sec)
//! - Network transport byte counters (§4.7, surfaced from `Network::stats`)
//! - Distributed sync counts (§4.8)

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Latency sample for histograms.
#[derive(Debug, Clone, Copy)]
pub struct LatencySample {
    pub duration_ms: f64,
    pub timestamp: Instant,
}

/// Rolling latency histogram with percentile calculation.
#[derive(Debug)]
pub struct LatencyHistogram {
    samples: VecDeque<LatencySample>,
    max_samples: usize,
}

impl LatencyHistogram {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample.
    pub fn record(&mut self, duration: Duration) {
        let sample = LatencySample {
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: Instant::now(),
        };

        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Get percentile value (0-100).
    pub fn percentile(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<f64> = self.samples.iter().map(|s| s.duration_ms).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted.get(idx).copied().unwrap_or(0.0)
    }

    /// Get average latency.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|s| s.duration_ms).sum();
        sum / self.samples.len() as f64
    }

    pub fn min(&self) -> f64 {
        self.samples.iter().map(|s| s.duration_ms).fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.samples.iter().map(|s| s.duration_ms).fold(0.0, f64::max)
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// Clear samples older than `max_age`.
    pub fn clear_old(&mut self, max_age: Duration) {
        let now = Instant::now();
        self.samples.retain(|s| now.duration_since(s.timestamp) < max_age);
    }
}

/// Core engine metrics.
pub struct EngineMetrics {
    // Request counters
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub active_requests: AtomicUsize,

    // Token counters
    pub total_tokens_generated: AtomicU64,
    pub total_prompt_tokens: AtomicU64,

    // Latency histograms (require lock for mutation)
    ttft_histogram: RwLock<LatencyHistogram>, // Time to First Token
    tpot_histogram: RwLock<LatencyHistogram>, // Time per Output Token
    total_latency_histogram: RwLock<LatencyHistogram>,

    // Transport counters (§4.7)
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub sync_count: AtomicU64,

    start_time: Instant,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            active_requests: AtomicUsize::new(0),
            total_tokens_generated: AtomicU64::new(0),
            total_prompt_tokens: AtomicU64::new(0),
            ttft_histogram: RwLock::new(LatencyHistogram::new(1000)),
            tpot_histogram: RwLock::new(LatencyHistogram::new(1000)),
            total_latency_histogram: RwLock::new(LatencyHistogram::new(1000)),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            sync_count: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    // ==================== REQUEST TRACKING ====================

    pub fn request_start(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.active_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_success(&self, total_duration: Duration, tokens_generated: usize) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.active_requests.fetch_sub(1, Ordering::Relaxed);
        self.total_tokens_generated.fetch_add(tokens_generated as u64, Ordering::Relaxed);

        if let Ok(mut hist) = self.total_latency_histogram.try_write() {
            hist.record(total_duration);
        }
    }

    pub fn request_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.active_requests.fetch_sub(1, Ordering::Relaxed);
    }

    // ==================== LATENCY TRACKING ====================

    pub async fn record_ttft(&self, duration: Duration) {
        self.ttft_histogram.write().await.record(duration);
    }

    pub async fn record_tpot(&self, duration: Duration) {
        self.tpot_histogram.write().await.record(duration);
    }

    pub fn record_prompt_tokens(&self, count: usize) {
        self.total_prompt_tokens.fetch_add(count as u64, Ordering::Relaxed);
    }

    // ==================== TRANSPORT TRACKING ====================

    /// Fold a node's `Network::stats()` snapshot into the running
    /// totals. Called once per forward step from the `run` loop rather
    /// than wired into `Network` itself, since `transport` has no
    /// metrics dependency of its own (§9 ambient logging/observability).
    pub fn record_transport(&self, sent: u64, received: u64) {
        self.bytes_sent.store(sent, Ordering::Relaxed);
        self.bytes_received.store(received, Ordering::Relaxed);
    }

    pub fn record_sync(&self) {
        self.sync_count.fetch_add(1, Ordering::Relaxed);
    }

    // ==================== STATISTICS ====================

    pub fn tokens_per_second(&self) -> f64 {
        let tokens = self.total_tokens_generated.load(Ordering::Relaxed);
        let uptime = self.start_time.elapsed().as_secs_f64();
        if uptime > 0.0 {
            tokens as f64 / uptime
        } else {
            0.0
        }
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        let success = self.successful_requests.load(Ordering::Relaxed);
        if total > 0 {
            success as f64 / total as f64
        } else {
            1.0
        }
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Comprehensive metrics snapshot.
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let ttft = self.ttft_histogram.read().await;
        let tpot = self.tpot_histogram.read().await;
        let total_lat = self.total_latency_histogram.read().await;

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            active_requests: self.active_requests.load(Ordering::Relaxed),

            total_tokens_generated: self.total_tokens_generated.load(Ordering::Relaxed),
            total_prompt_tokens: self.total_prompt_tokens.load(Ordering::Relaxed),
            tokens_per_second: self.tokens_per_second(),

            ttft_p50: ttft.percentile(50.0),
            ttft_p95: ttft.percentile(95.0),
            ttft_p99: ttft.percentile(99.0),
            tpot_avg: tpot.average(),
            total_latency_p50: total_lat.percentile(50.0),
            total_latency_p95: total_lat.percentile(95.0),

            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            sync_count: self.sync_count.load(Ordering::Relaxed),

            success_rate: self.success_rate(),
            uptime_secs: self.uptime_secs(),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics snapshot for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub active_requests: usize,

    pub total_tokens_generated: u64,
    pub total_prompt_tokens: u64,
    pub tokens_per_second: f64,

    pub ttft_p50: f64,
    pub ttft_p95: f64,
    pub ttft_p99: f64,
    pub tpot_avg: f64,
    pub total_latency_p50: f64,
    pub total_latency_p95: f64,

    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub sync_count: u64,

    pub success_rate: f64,
    pub uptime_secs: f64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<EngineMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(EngineMetrics::new())
}
