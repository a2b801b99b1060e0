//! Uniform invocation wrapper around a `Provider`
//!
//! Enforces the per-attempt timeout and reports every outcome to the
//! capacity monitor exactly once. No retries happen here.
//!
//! A timeout shorter than the descriptor's own is the caller's deadline,
//! so expiring it is reported as cancelled rather than as a failure.

use std::sync::Arc;
use std::time::Duration;

use switchyard_core::{InferenceRequest, InferenceResponse, ProviderDescriptor, ProviderError};
use switchyard_routing::{CallOutcome, CapacityMonitor};

use crate::provider::Provider;

/// A provider bound to the shared capacity monitor
#[derive(Clone)]
pub struct ProviderAdapter {
    provider: Arc<dyn Provider>,
    monitor: Arc<CapacityMonitor>,
}

impl ProviderAdapter {
    pub fn new(provider: Arc<dyn Provider>, monitor: Arc<CapacityMonitor>) -> Self {
        Self { provider, monitor }
    }

    pub fn provider_id(&self) -> &str {
        self.provider.id()
    }

    /// Call the provider once within `timeout`
    ///
    /// On timeout the in-flight call is dropped, which cancels it. Only a
    /// timeout at the descriptor's full limit counts against the provider.
    pub async fn invoke(
        &self,
        request: &InferenceRequest,
        descriptor: &ProviderDescriptor,
        timeout: Duration,
    ) -> Result<InferenceResponse, ProviderError> {
        let guard = self.monitor.begin(&descriptor.id);

        let result = match tokio::time::timeout(timeout, self.provider.complete(request, descriptor)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                elapsed_ms: u64::try_from(guard.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        };

        let outcome = match &result {
            Err(ProviderError::Timeout { .. }) if timeout < descriptor.timeout => CallOutcome::Cancelled,
            other => CallOutcome::of(other),
        };
        let latency = guard.finish(outcome);

        match &result {
            Ok(response) => tracing::debug!(
                request_id = %request.id,
                provider = %descriptor.id,
                latency_ms = latency.as_millis(),
                completion_tokens = response.usage.map(|u| u.completion_tokens),
                "provider call succeeded"
            ),
            Err(error) => tracing::warn!(
                request_id = %request.id,
                provider = %descriptor.id,
                latency_ms = latency.as_millis(),
                error_kind = error.kind(),
                error = %error,
                "provider call failed"
            ),
        }

        result
    }
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("provider", &self.provider.id())
            .finish_non_exhaustive()
    }
}
