use serde::Serialize;
use thiserror::Error;

/// Normalized failure of a single provider invocation
///
/// Every adapter maps its native errors into these variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The call did not finish within the per-attempt timeout
    #[error("provider timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The provider throttled the request
    #[error("provider rate limited the request")]
    RateLimited {
        /// Seconds until the provider accepts requests again, if known
        retry_after: Option<u64>,
    },

    /// The provider failed with a server-side error
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The provider refused the request as invalid
    #[error("provider rejected request with {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The provider could not be reached
    #[error("provider unreachable: {0}")]
    Unavailable(String),

    /// The provider answered with an unparseable body
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// The credential reference could not be resolved
    #[error("credential resolution failed: {0}")]
    Credentials(String),
}

impl ProviderError {
    /// Short machine-readable kind for logs and metrics
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::Upstream { .. } => "upstream",
            Self::Rejected { .. } => "rejected",
            Self::Unavailable(_) => "unavailable",
            Self::Malformed(_) => "malformed",
            Self::Credentials(_) => "credentials",
        }
    }
}

/// Caller-visible error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, never retried
    InvalidRequest,
    /// Every provider attempt failed
    ProviderError,
    /// Routing found nothing usable
    NoEligibleProvider,
    /// Escalation budget exhausted without an accepted response
    QualityUnattainable,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::ProviderError => "provider_error",
            Self::NoEligibleProvider => "no_eligible_provider",
            Self::QualityUnattainable => "quality_unattainable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
