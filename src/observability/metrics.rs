//! Decision and bundle metrics
//!
//! Prometheus metrics for `Check` outcomes, latency and in-flight calls, and
//! for JWT bundle updates.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

const NAMESPACE: &str = "jwt_auth_helper";

/// Metrics for the authorization service
pub struct CheckMetrics {
    registry: Registry,
    /// Decisions by mode, outcome and reason
    pub checks: IntCounterVec,
    /// Decision latency by mode
    pub duration: HistogramVec,
    /// Calls currently being decided
    pub in_flight: IntGauge,
    /// Applied JWT bundle updates
    pub bundle_updates: IntCounter,
}

impl CheckMetrics {
    /// Creates the metrics in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let checks = IntCounterVec::new(
            Opts::new("check_total", "Total authorization decisions").namespace(NAMESPACE),
            &["mode", "outcome", "reason"],
        )?;
        registry.register(Box::new(checks.clone()))?;

        let duration = HistogramVec::new(
            HistogramOpts::new("check_duration_seconds", "Authorization decision latency in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["mode"],
        )?;
        registry.register(Box::new(duration.clone()))?;

        let in_flight = IntGauge::with_opts(
            Opts::new("checks_in_flight", "Authorization decisions in progress").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(in_flight.clone()))?;

        let bundle_updates = IntCounter::with_opts(
            Opts::new("bundle_updates_total", "JWT bundle updates applied").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(bundle_updates.clone()))?;

        Ok(Self {
            registry,
            checks,
            duration,
            in_flight,
            bundle_updates,
        })
    }

    /// Records a finished decision
    pub fn record_check(&self, mode: &str, outcome: &str, reason: &str, latency_secs: f64) {
        self.checks.with_label_values(&[mode, outcome, reason]).inc();
        self.duration.with_label_values(&[mode]).observe(latency_secs);
    }

    /// Marks a call as in flight until the guard is dropped
    pub fn track_in_flight(&self) -> InFlightGuard {
        self.in_flight.inc();
        InFlightGuard {
            gauge: self.in_flight.clone(),
        }
    }

    /// Number of decisions recorded with these labels
    pub fn check_count(&self, mode: &str, outcome: &str, reason: &str) -> u64 {
        self.checks.with_label_values(&[mode, outcome, reason]).get()
    }

    /// Renders all metrics in the Prometheus text format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Decrements the in-flight gauge on drop
pub struct InFlightGuard {
    gauge: IntGauge,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
