//! Prometheus metrics for build sessions

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Instant;

pub struct BuilderMetrics {
    registry: Registry,

    pub builds_started: IntCounter,
    pub builds_completed: IntCounter,
    /// Labelled by `TxBuilderError::category()`
    pub builds_failed: IntCounterVec,
    pub submissions_ok: IntCounter,
    pub submissions_failed: IntCounter,

    pub fee_iterations: Histogram,
    pub drain_latency: Histogram,
    pub build_latency: Histogram,
}

impl BuilderMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let builds_started = IntCounter::with_opts(Opts::new(
            "cardano_tx_builds_started_total",
            "Number of complete() calls",
        ))?;
        let builds_completed = IntCounter::with_opts(Opts::new(
            "cardano_tx_builds_completed_total",
            "Number of sessions that produced a transaction",
        ))?;
        let builds_failed = IntCounterVec::new(
            Opts::new("cardano_tx_builds_failed_total", "Failed sessions by error category"),
            &["category"],
        )?;
        let submissions_ok = IntCounter::with_opts(Opts::new(
            "cardano_tx_submissions_ok_total",
            "Transactions accepted by the provider",
        ))?;
        let submissions_failed = IntCounter::with_opts(Opts::new(
            "cardano_tx_submissions_failed_total",
            "Transactions refused or lost in transport",
        ))?;

        let fee_iterations = Histogram::with_opts(
            HistogramOpts::new("cardano_tx_fee_iterations", "Fee fixed-point iterations per build")
                .buckets(vec![1.0, 2.0, 3.0, 4.0, 6.0, 10.0]),
        )?;
        let drain_latency = Histogram::with_opts(
            HistogramOpts::new("cardano_tx_drain_latency_seconds", "Deferred program drain latency")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        let build_latency = Histogram::with_opts(
            HistogramOpts::new("cardano_tx_build_latency_seconds", "End-to-end complete() latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;

        registry.register(Box::new(builds_started.clone()))?;
        registry.register(Box::new(builds_completed.clone()))?;
        registry.register(Box::new(builds_failed.clone()))?;
        registry.register(Box::new(submissions_ok.clone()))?;
        registry.register(Box::new(submissions_failed.clone()))?;
        registry.register(Box::new(fee_iterations.clone()))?;
        registry.register(Box::new(drain_latency.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;

        Ok(Self {
            registry,
            builds_started,
            builds_completed,
            builds_failed,
            submissions_ok,
            submissions_failed,
            fee_iterations,
            drain_latency,
            build_latency,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_failure(&self, category: &str) {
        self.builds_failed.with_label_values(&[category]).inc();
    }

    /// Prometheus text exposition of every registered metric
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

static METRICS: once_cell::sync::Lazy<Result<BuilderMetrics, prometheus::Error>> =
    once_cell::sync::Lazy::new(BuilderMetrics::new);

/// Global metrics instance; `None` if registration failed at startup
pub fn metrics() -> Option<&'static BuilderMetrics> {
    METRICS.as_ref().ok()
}

/// Measures a duration and records it into a histogram on `observe`
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn observe(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
