//! Gateway statistics tracking.
//!
//! Tracks request counts, blocks, bypasses, errors and latencies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Thread-safe gateway statistics
#[derive(Debug, Default)]
pub struct ProxyStats {
    /// Total requests handled
    requests: AtomicU64,
    /// Requests answered with an intercepted event stream
    streaming_requests: AtomicU64,
    /// Requests rejected before or after the upstream call
    blocked: AtomicU64,
    /// Requests with no rule bound
    bypassed: AtomicU64,
    /// Upstream and gateway failures
    errors: AtomicU64,
    /// Request latencies (for percentile calculation)
    latencies: RwLock<Vec<Duration>>,
    /// Start time
    started_at: RwLock<Option<Instant>>,
}

impl ProxyStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            started_at: RwLock::new(Some(Instant::now())),
            ..Default::default()
        }
    }

    /// Record a request whose response was produced
    pub fn record_request(&self, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut latencies) = self.latencies.write() {
            latencies.push(latency);
            // Keep last 1000 latencies for percentile calculation
            if latencies.len() > 1000 {
                latencies.remove(0);
            }
        }
    }

    /// Record a response handed to the stream interceptor
    pub fn record_streaming_request(&self) {
        self.streaming_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a blocked request, including a stream cut short mid-way.
    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request forwarded without any rule
    pub fn record_bypassed(&self) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total requests
    pub fn total_requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Get streaming requests count
    pub fn streaming_requests(&self) -> u64 {
        self.streaming_requests.load(Ordering::Relaxed)
    }

    /// Get blocked count
    pub fn total_blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    /// Get bypassed count
    pub fn total_bypassed(&self) -> u64 {
        self.bypassed.load(Ordering::Relaxed)
    }

    /// Get total errors
    pub fn total_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Get p50 latency
    pub fn p50_latency(&self) -> Option<Duration> {
        self.percentile_latency(50)
    }

    /// Get p95 latency
    pub fn p95_latency(&self) -> Option<Duration> {
        self.percentile_latency(95)
    }

    /// Get p99 latency
    pub fn p99_latency(&self) -> Option<Duration> {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> Option<Duration> {
        let latencies = self.latencies.read().ok()?;
        if latencies.is_empty() {
            return None;
        }

        let mut sorted = latencies.clone();
        sorted.sort();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        Some(sorted[idx])
    }

    /// Get uptime
    pub fn uptime(&self) -> Duration {
        self.started_at
            .read()
            .ok()
            .and_then(|s| s.map(|start| start.elapsed()))
            .unwrap_or_default()
    }

    /// Get summary as JSON-compatible struct
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            total_requests: self.total_requests(),
            streaming_requests: self.streaming_requests(),
            blocked_requests: self.total_blocked(),
            bypassed_requests: self.total_bypassed(),
            total_errors: self.total_errors(),
            p50_latency_ms: self.p50_latency().map(|d| d.as_secs_f64() * 1000.0),
            p95_latency_ms: self.p95_latency().map(|d| d.as_secs_f64() * 1000.0),
            p99_latency_ms: self.p99_latency().map(|d| d.as_secs_f64() * 1000.0),
            uptime_secs: self.uptime().as_secs(),
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.streaming_requests.store(0, Ordering::Relaxed);
        self.blocked.store(0, Ordering::Relaxed);
        self.bypassed.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);

        if let Ok(mut latencies) = self.latencies.write() {
            latencies.clear();
        }

        if let Ok(mut started) = self.started_at.write() {
            *started = Some(Instant::now());
        }
    }
}

/// Statistics summary for serialization.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatsSummary {
    /// Total number of requests handled.
    pub total_requests: u64,
    /// Responses passed through the stream interceptor.
    pub streaming_requests: u64,
    /// Requests blocked anywhere, including mid-stream.
    pub blocked_requests: u64,
    /// Requests forwarded without a rule.
    pub bypassed_requests: u64,
    /// Total number of errors encountered.
    pub total_errors: u64,
    /// 50th percentile latency in milliseconds.
    pub p50_latency_ms: Option<f64>,
    /// 95th percentile latency in milliseconds.
    pub p95_latency_ms: Option<f64>,
    /// 99th percentile latency in milliseconds.
    pub p99_latency_ms: Option<f64>,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_recording() {
        let stats = ProxyStats::new();

        stats.record_request(Duration::from_millis(50));
        stats.record_request(Duration::from_millis(100));
        stats.record_blocked();
        stats.record_bypassed();

        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.total_blocked(), 1);
        assert_eq!(stats.total_bypassed(), 1);
        assert_eq!(stats.total_errors(), 0);
    }

    #[test]
    fn test_latency_percentiles() {
        let stats = ProxyStats::new();

        for i in 1..=100 {
            stats.record_request(Duration::from_millis(i));
        }

        let p50 = stats.p50_latency().unwrap();
        let p99 = stats.p99_latency().unwrap();

        assert!(p50.as_millis() >= 49 && p50.as_millis() <= 51);
        assert!(p99.as_millis() >= 98 && p99.as_millis() <= 100);
    }

    #[test]
    fn test_reset() {
        let stats = ProxyStats::new();
        stats.record_streaming_request();
        stats.record_error();
        stats.record_request(Duration::from_millis(5));

        stats.reset();
        let summary = stats.summary();
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.streaming_requests, 0);
        assert!(summary.p50_latency_ms.is_none());
    }
}
