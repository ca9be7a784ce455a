use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::dispatch::DispatchError;
use crate::domain::{DeliveryStatus, DispatchResult, OverallStatus};

/// Metrics registry for the application.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Total forward requests processed
    pub requests_total: AtomicU64,

    /// Forward requests by outcome
    pub requests_success: AtomicU64,
    pub requests_partial_failure: AtomicU64,
    pub requests_failure: AtomicU64,
    pub requests_invalid_payload: AtomicU64,
    pub requests_no_enabled_rules: AtomicU64,
    pub requests_registry_unavailable: AtomicU64,

    /// Per-endpoint deliveries
    pub deliveries_succeeded: AtomicU64,
    pub deliveries_failed: AtomicU64,
    pub deliveries_timed_out: AtomicU64,
    pub deliveries_abandoned: AtomicU64,

    /// Dispatch latency buckets
    pub latency_under_10ms: AtomicU64,
    pub latency_10_50ms: AtomicU64,
    pub latency_50_100ms: AtomicU64,
    pub latency_100_500ms: AtomicU64,
    pub latency_500_1000ms: AtomicU64,
    pub latency_over_1000ms: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record a completed dispatch and its deliveries.
    pub fn record_dispatch(&self, result: &DispatchResult) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        match result.overall_status {
            OverallStatus::Success => {
                self.requests_success.fetch_add(1, Ordering::Relaxed);
            }
            OverallStatus::PartialFailure => {
                self.requests_partial_failure.fetch_add(1, Ordering::Relaxed);
            }
            OverallStatus::Failure => {
                self.requests_failure.fetch_add(1, Ordering::Relaxed);
            }
        }

        for outcome in &result.outcomes {
            match &outcome.status {
                DeliveryStatus::Delivered { .. } => {
                    self.deliveries_succeeded.fetch_add(1, Ordering::Relaxed);
                }
                DeliveryStatus::Failed { error } => {
                    self.deliveries_failed.fetch_add(1, Ordering::Relaxed);
                    if error.is_timeout() {
                        self.deliveries_timed_out.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        self.deliveries_abandoned
            .fetch_add(result.abandoned as u64, Ordering::Relaxed);
    }

    /// Record a dispatch rejected before delivery.
    pub fn record_error(&self, error: &DispatchError) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let counter = match error {
            DispatchError::InvalidPayload(_) => &self.requests_invalid_payload,
            DispatchError::NoEnabledRules => &self.requests_no_enabled_rules,
            DispatchError::RegistryUnavailable => &self.requests_registry_unavailable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record dispatch latency.
    pub fn record_latency(&self, start: Instant) {
        let millis = start.elapsed().as_millis() as u64;

        let bucket = if millis < 10 {
            &self.latency_under_10ms
        } else if millis < 50 {
            &self.latency_10_50ms
        } else if millis < 100 {
            &self.latency_50_100ms
        } else if millis < 500 {
            &self.latency_100_500ms
        } else if millis < 1000 {
            &self.latency_500_1000ms
        } else {
            &self.latency_over_1000ms
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP forwarder_requests_total Total number of forward requests
# TYPE forwarder_requests_total counter
forwarder_requests_total {}

# HELP forwarder_requests Forward requests by outcome
# TYPE forwarder_requests counter
forwarder_requests{{outcome="success"}} {}
forwarder_requests{{outcome="partial_failure"}} {}
forwarder_requests{{outcome="failure"}} {}
forwarder_requests{{outcome="invalid_payload"}} {}
forwarder_requests{{outcome="no_enabled_rules"}} {}
forwarder_requests{{outcome="registry_unavailable"}} {}

# HELP forwarder_deliveries Analyzer deliveries by result
# TYPE forwarder_deliveries counter
forwarder_deliveries{{result="delivered"}} {}
forwarder_deliveries{{result="failed"}} {}
forwarder_deliveries{{result="timed_out"}} {}
forwarder_deliveries{{result="abandoned"}} {}

# HELP forwarder_dispatch_latency_bucket Dispatch latency histogram
# TYPE forwarder_dispatch_latency_bucket counter
forwarder_dispatch_latency_bucket{{le="0.01"}} {}
forwarder_dispatch_latency_bucket{{le="0.05"}} {}
forwarder_dispatch_latency_bucket{{le="0.1"}} {}
forwarder_dispatch_latency_bucket{{le="0.5"}} {}
forwarder_dispatch_latency_bucket{{le="1"}} {}
forwarder_dispatch_latency_bucket{{le="+Inf"}} {}
"#,
            self.requests_total.load(Ordering::Relaxed),
            self.requests_success.load(Ordering::Relaxed),
            self.requests_partial_failure.load(Ordering::Relaxed),
            self.requests_failure.load(Ordering::Relaxed),
            self.requests_invalid_payload.load(Ordering::Relaxed),
            self.requests_no_enabled_rules.load(Ordering::Relaxed),
            self.requests_registry_unavailable.load(Ordering::Relaxed),
            self.deliveries_succeeded.load(Ordering::Relaxed),
            self.deliveries_failed.load(Ordering::Relaxed),
            self.deliveries_timed_out.load(Ordering::Relaxed),
            self.deliveries_abandoned.load(Ordering::Relaxed),
            self.latency_under_10ms.load(Ordering::Relaxed),
            self.latency_10_50ms.load(Ordering::Relaxed),
            self.latency_50_100ms.load(Ordering::Relaxed),
            self.latency_100_500ms.load(Ordering::Relaxed),
            self.latency_500_1000ms.load(Ordering::Relaxed),
            self.latency_over_1000ms.load(Ordering::Relaxed),
        )
    }
}

/// Guard for timing operations.
pub struct TimingGuard<'a> {
    registry: &'a MetricsRegistry,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(registry: &'a MetricsRegistry) -> Self {
        TimingGuard {
            registry,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for TimingGuard<'a> {
    fn drop(&mut self) {
        self.registry.record_latency(self.start);
    }
}
