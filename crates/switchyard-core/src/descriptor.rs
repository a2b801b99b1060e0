use std::time::Duration;

use switchyard_config::{BackendProtocol, CredentialRef, ProviderConfig, ProviderKind};
use url::Url;

/// Capability and quota limits of a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityLimits {
    /// Context window in tokens
    pub max_context_tokens: u32,
    /// Maximum generated tokens per request
    pub max_output_tokens: Option<u32>,
    /// Requests per minute quota
    pub requests_per_minute: Option<u32>,
    /// Tokens per minute quota
    pub tokens_per_minute: Option<u32>,
}

/// Immutable description of one provider, built from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// Unique identifier
    pub id: String,
    /// Local or cloud
    pub kind: ProviderKind,
    /// Wire protocol
    pub protocol: BackendProtocol,
    /// Base URL
    pub endpoint: Url,
    /// Model served
    pub model: String,
    /// Opaque credential reference
    pub credentials: CredentialRef,
    /// Capability limits
    pub limits: CapabilityLimits,
    /// Static priority, higher is preferred
    pub priority: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl ProviderDescriptor {
    /// Build a descriptor from validated configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the credential reference or timeout cannot be parsed
    pub fn from_config(config: &ProviderConfig) -> anyhow::Result<Self> {
        let credentials = config
            .credentials
            .as_deref()
            .map(str::parse::<CredentialRef>)
            .transpose()
            .map_err(|e| anyhow::anyhow!("provider '{}': {e}", config.id))?
            .unwrap_or_default();

        Ok(Self {
            id: config.id.clone(),
            kind: config.kind,
            protocol: config.protocol,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            credentials,
            limits: CapabilityLimits {
                max_context_tokens: config.limits.max_context_tokens,
                max_output_tokens: config.limits.max_output_tokens,
                requests_per_minute: config.limits.requests_per_minute,
                tokens_per_minute: config.limits.tokens_per_minute,
            },
            priority: config.priority,
            timeout: switchyard_config::parse_duration(&config.timeout)?,
        })
    }

    pub fn is_local(&self) -> bool {
        self.kind == ProviderKind::Local
    }
}
