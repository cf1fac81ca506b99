//! Metrics and monitoring for the gateway
//!
//! ## Table of Contents
//! - **GatewayMetrics**: Prometheus collectors for requests, batches and HTTP traffic
//! - **Timer**: Small helper for measuring durations

use crate::error::{GatewayError, Result};
use prometheus::{
    CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry,
};

/// Core metrics for the gateway
pub struct GatewayMetrics {
    registry: Registry,

    // Request metrics
    pub requests_total: CounterVec,
    pub request_duration: HistogramVec,
    pub requests_in_flight: Gauge,

    // Batch metrics
    pub batches_total: CounterVec,
    pub batch_duration: HistogramVec,
    pub compute_in_flight: Gauge,

    // HTTP metrics
    pub http_requests_total: CounterVec,
    pub http_request_duration: HistogramVec,
}

impl GatewayMetrics {
    /// Create a new metrics instance
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("gateway_requests_total", "Inference requests by outcome"),
            &["outcome"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new("gateway_request_duration_seconds", "End-to-end request duration")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 90.0]),
            &["outcome"],
        )?;
        let requests_in_flight = Gauge::new(
            "gateway_requests_in_flight",
            "Requests currently holding an admission permit",
        )?;

        let batches_total = CounterVec::new(
            Opts::new("gateway_batches_total", "Compute batches by status"),
            &["status"],
        )?;
        let batch_duration = HistogramVec::new(
            HistogramOpts::new("gateway_batch_duration_seconds", "Compute time per batch")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["status"],
        )?;
        let compute_in_flight = Gauge::new(
            "gateway_compute_in_flight",
            "Worker slots currently running compute",
        )?;

        let http_requests_total = CounterVec::new(
            Opts::new("gateway_http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )?;
        let http_request_duration = HistogramVec::new(
            HistogramOpts::new("gateway_http_request_duration_seconds", "HTTP request duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["method", "path"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(requests_in_flight.clone()))?;
        registry.register(Box::new(batches_total.clone()))?;
        registry.register(Box::new(batch_duration.clone()))?;
        registry.register(Box::new(compute_in_flight.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            requests_in_flight,
            batches_total,
            batch_duration,
            compute_in_flight,
            http_requests_total,
            http_request_duration,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the terminal outcome of a request
    pub fn record_request(&self, outcome: &str, duration_secs: f64) {
        self.requests_total.with_label_values(&[outcome]).inc();
        self.request_duration
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    /// Record a permit being taken
    pub fn record_admitted(&self) {
        self.requests_in_flight.inc();
    }

    /// Record a permit being returned
    pub fn record_released(&self) {
        self.requests_in_flight.dec();
    }

    /// Record a worker slot starting compute
    pub fn record_compute_started(&self) {
        self.compute_in_flight.inc();
    }

    /// Record a finished compute call
    pub fn record_batch(&self, success: bool, duration_secs: f64) {
        self.compute_in_flight.dec();
        let status = if success { "success" } else { "failed" };
        self.batches_total.with_label_values(&[status]).inc();
        self.batch_duration
            .with_label_values(&[status])
            .observe(duration_secs);
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Gather all metrics as text
    pub fn gather_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| GatewayError::metrics(format!("Encode error: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| GatewayError::metrics(format!("UTF8 error: {}", e)))
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = GatewayMetrics::new().unwrap();
        assert!(metrics.gather_text().is_ok());
    }

    #[test]
    fn test_request_metrics() {
        let metrics = GatewayMetrics::new().unwrap();

        metrics.record_admitted();
        metrics.record_admitted();
        metrics.record_released();
        metrics.record_request("completed", 0.2);
        metrics.record_request("overloaded", 20.0);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("gateway_requests_in_flight 1"));
        assert!(text.contains("gateway_requests_total{outcome=\"completed\"} 1"));
        assert!(text.contains("gateway_requests_total{outcome=\"overloaded\"} 1"));
    }

    #[test]
    fn test_batch_metrics() {
        let metrics = GatewayMetrics::new().unwrap();

        metrics.record_compute_started();
        metrics.record_compute_started();
        metrics.record_batch(true, 0.01);
        metrics.record_batch(false, 0.02);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("gateway_compute_in_flight 0"));
        assert!(text.contains("gateway_batches_total{status=\"success\"} 1"));
        assert!(text.contains("gateway_batches_total{status=\"failed\"} 1"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_secs() >= 0.01);
    }
}
