//! Per-provider request and token quotas
//!
//! Admission control only: a denied check excludes the provider for one
//! request and never touches circuit state.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use switchyard_core::ProviderDescriptor;

/// Requests-per-minute and tokens-per-minute limiters for one provider
pub struct ProviderQuota {
    limits: (Option<u32>, Option<u32>),
    requests: Option<DefaultDirectRateLimiter>,
    tokens: Option<DefaultDirectRateLimiter>,
}

impl ProviderQuota {
    pub fn new(requests_per_minute: Option<u32>, tokens_per_minute: Option<u32>) -> Self {
        let limiter = |per_minute: Option<u32>| {
            per_minute
                .and_then(NonZeroU32::new)
                .map(|n| RateLimiter::direct(Quota::per_minute(n)))
        };
        Self {
            limits: (requests_per_minute, tokens_per_minute),
            requests: limiter(requests_per_minute),
            tokens: limiter(tokens_per_minute),
        }
    }

    /// Whether neither quota is configured
    pub const fn is_unlimited(&self) -> bool {
        self.requests.is_none() && self.tokens.is_none()
    }

    /// Consume one request and `tokens` tokens if both fit
    ///
    /// The request slot is taken first; a token denial does not return it.
    pub fn try_acquire(&self, tokens: u32) -> bool {
        let n = NonZeroU32::new(tokens).unwrap_or(NonZeroU32::MIN);
        let request_admitted = self.requests.as_ref().is_none_or(|limiter| limiter.check().is_ok());
        request_admitted
            && self
                .tokens
                .as_ref()
                .is_none_or(|limiter| matches!(limiter.check_n(n), Ok(Ok(()))))
    }
}

impl std::fmt::Debug for ProviderQuota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderQuota")
            .field("requests", &self.requests.is_some())
            .field("tokens", &self.tokens.is_some())
            .finish()
    }
}

/// Quotas for every provider in a catalog
#[derive(Debug, Default)]
pub struct QuotaBook {
    quotas: HashMap<String, Arc<ProviderQuota>>,
}

impl QuotaBook {
    /// Build limiters for every descriptor that declares a quota
    pub fn from_descriptors<'a>(descriptors: impl IntoIterator<Item = &'a ProviderDescriptor>) -> Self {
        let quotas = descriptors
            .into_iter()
            .filter_map(|d| {
                let quota = ProviderQuota::new(d.limits.requests_per_minute, d.limits.tokens_per_minute);
                (!quota.is_unlimited()).then(|| (d.id.clone(), Arc::new(quota)))
            })
            .collect();
        Self { quotas }
    }

    /// Reuse `previous` limiters for providers whose limits are unchanged
    ///
    /// Their consumed budget carries over instead of resetting on reload.
    pub fn inherit(&mut self, previous: &Self) {
        for (id, quota) in &mut self.quotas {
            if let Some(old) = previous.quotas.get(id)
                && old.limits == quota.limits
            {
                *quota = Arc::clone(old);
            }
        }
    }

    /// Admit one request of `tokens` tokens; unlimited providers always pass
    pub fn try_acquire(&self, provider: &str, tokens: u32) -> bool {
        self.quotas.get(provider).is_none_or(|quota| quota.try_acquire(tokens))
    }
}
