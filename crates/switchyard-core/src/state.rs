use serde::Serialize;

/// Circuit breaker state for a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, requests flow through
    Closed,
    /// Provider is failing, requests are blocked
    Open,
    /// Cooldown elapsed, one probe request may test recovery
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time view of a provider's live metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderState {
    /// Provider identifier
    pub provider_id: String,
    /// Requests currently in flight
    pub queue_depth: u32,
    /// Mean latency over the rolling window, in milliseconds
    pub mean_latency_ms: Option<f64>,
    /// Median latency over the rolling window, in milliseconds
    pub p50_latency_ms: Option<f64>,
    /// Fraction of failed calls in the rolling window
    pub error_rate: Option<f64>,
    /// Calls in the rolling window
    pub sample_count: usize,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Circuit breaker state
    pub circuit: CircuitState,
    /// Whether the router may send a request here now
    pub available: bool,
}

impl ProviderState {
    /// State of a provider that has never been called
    pub fn fresh(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            queue_depth: 0,
            mean_latency_ms: None,
            p50_latency_ms: None,
            error_rate: None,
            sample_count: 0,
            consecutive_failures: 0,
            circuit: CircuitState::Closed,
            available: true,
        }
    }
}
