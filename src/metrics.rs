//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Sign pipeline
    pub sign_requests: IntCounter,
    pub approvals_granted: IntCounter,
    pub approvals_rejected: IntCounter,
    pub approval_timeouts: IntCounter,
    pub remote_sign_failures: IntCounter,

    // Broadcast
    pub broadcast_attempts: IntCounter,
    pub broadcast_failures: IntCounter,
    pub confirmation_timeouts: IntCounter,

    // Cache
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,

    // Estimation and simulation
    pub unit_estimate_failures: IntCounter,
    pub simulation_failures: IntCounter,

    // Gauges
    pub pending_approvals: IntGauge,

    // Histograms
    pub build_latency: Histogram,
    pub approval_wait: Histogram,
    pub confirmation_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let sign_requests = IntCounter::with_opts(Opts::new(
            "sign_requests_total",
            "Sign requests routed through the approval gate",
        ))?;

        let approvals_granted =
            IntCounter::with_opts(Opts::new("approvals_granted_total", "Requests approved by the user"))?;

        let approvals_rejected = IntCounter::with_opts(Opts::new(
            "approvals_rejected_total",
            "Requests cancelled by the user",
        ))?;

        let approval_timeouts = IntCounter::with_opts(Opts::new(
            "approval_timeouts_total",
            "Requests auto-rejected after the approval window",
        ))?;

        let remote_sign_failures = IntCounter::with_opts(Opts::new(
            "remote_sign_failures_total",
            "Approved requests the signing backend failed",
        ))?;

        let broadcast_attempts = IntCounter::with_opts(Opts::new(
            "broadcast_attempts_total",
            "sendTransaction attempts, including retries",
        ))?;

        let broadcast_failures = IntCounter::with_opts(Opts::new(
            "broadcast_failures_total",
            "Sends that exhausted their retry budget",
        ))?;

        let confirmation_timeouts = IntCounter::with_opts(Opts::new(
            "confirmation_timeouts_total",
            "Signatures not confirmed before the deadline",
        ))?;

        let cache_hits = IntCounter::with_opts(Opts::new("cache_hits_total", "Persistent cache hits"))?;

        let cache_misses = IntCounter::with_opts(Opts::new(
            "cache_misses_total",
            "Persistent cache misses, including expired and stale entries",
        ))?;

        let unit_estimate_failures = IntCounter::with_opts(Opts::new(
            "unit_estimate_failures_total",
            "Builds that proceeded without a compute-unit limit",
        ))?;

        let simulation_failures = IntCounter::with_opts(Opts::new(
            "simulation_failures_total",
            "Balance-diff simulations rejected by the chain",
        ))?;

        let pending_approvals = IntGauge::with_opts(Opts::new(
            "pending_approvals",
            "Requests currently waiting for a user decision",
        ))?;

        let build_latency = Histogram::with_opts(
            HistogramOpts::new("build_latency_seconds", "Transaction build latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;

        let approval_wait = Histogram::with_opts(
            HistogramOpts::new("approval_wait_seconds", "Time users take to decide")
                .buckets(vec![1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 60.0]),
        )?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Time from first successful send to confirmation",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 15.0, 30.0, 60.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(sign_requests.clone()))?;
        registry.register(Box::new(approvals_granted.clone()))?;
        registry.register(Box::new(approvals_rejected.clone()))?;
        registry.register(Box::new(approval_timeouts.clone()))?;
        registry.register(Box::new(remote_sign_failures.clone()))?;
        registry.register(Box::new(broadcast_attempts.clone()))?;
        registry.register(Box::new(broadcast_failures.clone()))?;
        registry.register(Box::new(confirmation_timeouts.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(unit_estimate_failures.clone()))?;
        registry.register(Box::new(simulation_failures.clone()))?;
        registry.register(Box::new(pending_approvals.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;
        registry.register(Box::new(approval_wait.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            sign_requests,
            approvals_granted,
            approvals_rejected,
            approval_timeouts,
            remote_sign_failures,
            broadcast_attempts,
            broadcast_failures,
            confirmation_timeouts,
            cache_hits,
            cache_misses,
            unit_estimate_failures,
            simulation_failures,
            pending_approvals,
            build_latency,
            approval_wait,
            confirmation_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_registry_exports_all_families() {
        let m = Metrics::new().unwrap();
        m.sign_requests.inc();
        m.build_latency.observe(0.2);

        let text = m.encode_text().unwrap();
        assert!(text.contains("sign_requests_total 1"));
        assert!(text.contains("build_latency_seconds_bucket"));
        assert!(text.contains("pending_approvals 0"));
    }

    #[test]
    fn test_global_instance_is_shared() {
        let before = metrics().cache_hits.get();
        metrics().cache_hits.inc();
        assert!(metrics().cache_hits.get() > before);
    }
}
