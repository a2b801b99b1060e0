//! Metric names and recording helpers for the router

use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Routing decisions made, by provider and reason
pub const ROUTER_DECISION_COUNT: &str = "router.decision.count";

/// Provider attempt latency in seconds, by provider and outcome
pub const ROUTER_ATTEMPT_DURATION: &str = "router.attempt.duration";

/// Re-routes after a rejected response or provider error
pub const ROUTER_ESCALATION_COUNT: &str = "router.escalation.count";

/// Requests finished, by terminal state and error kind
pub const ROUTER_REQUEST_COUNT: &str = "router.request.count";

/// Instruments used by the orchestrator
///
/// Backed by the global meter provider; a no-op meter when no exporter
/// is configured.
#[derive(Debug, Clone)]
pub struct RouterMetrics {
    pub decisions: Counter<u64>,
    pub attempt_duration: Histogram<f64>,
    pub escalations: Counter<u64>,
    pub requests: Counter<u64>,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::from_meter(&global::meter("switchyard"))
    }

    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            decisions: meter
                .u64_counter(ROUTER_DECISION_COUNT)
                .with_description("Routing decisions made")
                .build(),
            attempt_duration: meter
                .f64_histogram(ROUTER_ATTEMPT_DURATION)
                .with_description("Provider attempt latency")
                .with_unit("s")
                .build(),
            escalations: meter
                .u64_counter(ROUTER_ESCALATION_COUNT)
                .with_description("Escalations to another provider")
                .build(),
            requests: meter
                .u64_counter(ROUTER_REQUEST_COUNT)
                .with_description("Requests finished")
                .build(),
        }
    }
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Record elapsed time since `start` in seconds
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[KeyValue]) {
    histogram.record(start.elapsed().as_secs_f64(), attributes);
}
