//! Provider selection
//!
//! Filters the configured providers by privacy, availability and
//! capability, ranks the survivors, and admits the best one against its
//! quota. The rest of the ranking becomes the fallback chain.

use std::sync::Arc;

use switchyard_config::RouterConfig;
use switchyard_core::{ComplexityProfile, DecisionReason, Exclusion, ProviderDescriptor, RequestHistory, RoutingDecision};

use crate::affinity::AffinityMap;
use crate::capacity::CapacityMonitor;
use crate::error::RoutingError;
use crate::quota::QuotaBook;
use crate::ranking::{PolicyRegistry, RankInput, Ranked, RankingPolicy, WeightedRanking, rank};

/// Immutable provider set with its quota limiters
#[derive(Debug, Default)]
pub struct ProviderPool {
    descriptors: Vec<Arc<ProviderDescriptor>>,
    quotas: QuotaBook,
}

impl ProviderPool {
    /// Build a pool, creating quota limiters for descriptors that declare limits
    pub fn new(descriptors: Vec<Arc<ProviderDescriptor>>) -> Self {
        let quotas = QuotaBook::from_descriptors(descriptors.iter().map(AsRef::as_ref));
        Self { descriptors, quotas }
    }

    /// Descriptors in declaration order
    pub fn descriptors(&self) -> &[Arc<ProviderDescriptor>] {
        &self.descriptors
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ProviderDescriptor>> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub const fn quotas(&self) -> &QuotaBook {
        &self.quotas
    }

    /// Carry over quota state from the pool this one replaces
    pub fn inherit_quotas(&mut self, previous: &Self) {
        self.quotas.inherit(&previous.quotas);
    }
}

/// Routing engine shared by every request
pub struct RoutingEngine {
    monitor: Arc<CapacityMonitor>,
    policy: Arc<dyn RankingPolicy>,
    affinity: AffinityMap,
}

impl RoutingEngine {
    pub fn new(monitor: Arc<CapacityMonitor>, policy: Arc<dyn RankingPolicy>, affinity_capacity: usize) -> Self {
        Self {
            monitor,
            policy,
            affinity: AffinityMap::new(affinity_capacity),
        }
    }

    /// Build with the ranking policy selected in config
    pub fn from_config(config: &RouterConfig, monitor: Arc<CapacityMonitor>) -> Self {
        let registry = PolicyRegistry::from_config(&config.ranking);
        let policy = registry
            .get(PolicyRegistry::resolve_name(&config.ranking))
            .unwrap_or_else(|| Arc::new(WeightedRanking::new(&config.ranking)));
        Self::new(monitor, policy, config.ranking.affinity_capacity)
    }

    pub const fn monitor(&self) -> &Arc<CapacityMonitor> {
        &self.monitor
    }

    pub const fn affinity(&self) -> &AffinityMap {
        &self.affinity
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    /// Remember the provider that produced an accepted response
    pub fn record_success(&self, profile: &ComplexityProfile, provider_id: &str) {
        if let Some(key) = profile.affinity_key.as_deref() {
            self.affinity.remember(key, provider_id);
        }
    }

    /// Produce a routing decision for one routing step of a request
    ///
    /// `history` holds earlier decisions and attempts of the same request.
    /// When it has a previous decision, the next untried entry of that
    /// decision's fallback chain is preferred over a fresh ranking.
    pub fn route(
        &self,
        profile: &ComplexityProfile,
        pool: &ProviderPool,
        history: &RequestHistory,
    ) -> Result<RoutingDecision, RoutingError> {
        self.decide(profile, pool, history, true)
    }

    /// Produce the decision `route` would make, without admitting the primary
    ///
    /// No probe slot is claimed and no quota is consumed, so quota
    /// exhaustion is not reflected in the result.
    pub fn plan(
        &self,
        profile: &ComplexityProfile,
        pool: &ProviderPool,
        history: &RequestHistory,
    ) -> Result<RoutingDecision, RoutingError> {
        self.decide(profile, pool, history, false)
    }

    fn decide(
        &self,
        profile: &ComplexityProfile,
        pool: &ProviderPool,
        history: &RequestHistory,
        admit: bool,
    ) -> Result<RoutingDecision, RoutingError> {
        let mut excluded: Vec<(String, Exclusion)> = Vec::new();

        let candidates: Vec<&Arc<ProviderDescriptor>> = pool
            .descriptors()
            .iter()
            .filter(|d| {
                if profile.privacy_sensitive && !d.is_local() {
                    excluded.push((d.id.clone(), Exclusion::CloudForbidden));
                    return false;
                }
                true
            })
            .collect();

        let mut eligible = Vec::with_capacity(candidates.len());
        for descriptor in candidates {
            let state = self.monitor.snapshot(&descriptor.id);
            if let Some(reason) = ineligibility(profile, descriptor, state.available) {
                excluded.push((descriptor.id.clone(), reason));
            } else {
                eligible.push((descriptor, state));
            }
        }

        if eligible.iter().any(|(d, _)| !history.tried(&d.id)) {
            eligible.retain(|(d, _)| {
                if history.tried(&d.id) {
                    excluded.push((d.id.clone(), Exclusion::AlreadyTried));
                    return false;
                }
                true
            });
        }

        if eligible.is_empty() {
            return Err(no_eligible(excluded));
        }

        let sticky = profile
            .affinity_key
            .as_deref()
            .and_then(|key| self.affinity.get(key));
        let max_priority = eligible.iter().map(|(d, _)| d.priority).max().unwrap_or(0);
        let inputs: Vec<RankInput<'_>> = eligible
            .iter()
            .map(|(descriptor, state)| RankInput {
                descriptor,
                state,
                profile,
                affinity: sticky.as_deref() == Some(descriptor.id.as_str()),
                max_priority,
            })
            .collect();
        let mut ranked = rank(self.policy.as_ref(), &inputs);

        let preferred = history.last_decision().and_then(|previous| {
            previous
                .fallback
                .iter()
                .find_map(|f| ranked.iter().position(|r| r.descriptor.id == f.id))
        });
        let preferred_id = preferred.map(|idx| {
            let entry = ranked.remove(idx);
            let id = entry.descriptor.id.clone();
            ranked.insert(0, entry);
            id
        });

        let chosen = if admit {
            self.admit(&ranked, pool, profile.required_context_tokens, &mut excluded)
        } else {
            Some(0)
        };

        let Some(idx) = chosen else {
            return Err(no_eligible(excluded));
        };

        let primary = ranked[idx];
        let reason = if history.last_decision().is_some() {
            if preferred_id.as_deref() == Some(primary.descriptor.id.as_str()) {
                DecisionReason::Fallback
            } else {
                DecisionReason::Reranked
            }
        } else if profile.privacy_sensitive {
            DecisionReason::PrivacyRestricted
        } else if primary.affinity {
            DecisionReason::Affinity
        } else {
            DecisionReason::Ranked
        };

        let decision = RoutingDecision {
            primary: Arc::clone(primary.descriptor),
            reason,
            fallback: ranked[idx + 1..]
                .iter()
                .map(|r| Arc::clone(r.descriptor))
                .collect(),
            excluded,
        };

        tracing::info!(
            provider = %decision.primary.id,
            kind = %decision.primary.kind,
            reason = %decision.reason,
            score = primary.score,
            policy = self.policy.name(),
            fallback = decision.fallback.len(),
            excluded = decision.excluded.len(),
            dry_run = !admit,
            "routing decision made"
        );

        Ok(decision)
    }

    /// Index of the first ranked candidate that passes circuit and quota admission
    fn admit(
        &self,
        ranked: &[Ranked<'_>],
        pool: &ProviderPool,
        tokens: u32,
        excluded: &mut Vec<(String, Exclusion)>,
    ) -> Option<usize> {
        for (idx, candidate) in ranked.iter().enumerate() {
            let id = candidate.descriptor.id.as_str();
            if !self.monitor.try_admit(id) {
                excluded.push((id.to_owned(), Exclusion::CircuitOpen));
                continue;
            }
            if !pool.quotas().try_acquire(id, tokens) {
                self.monitor.release(id);
                tracing::debug!(provider = id, tokens, "provider quota exhausted");
                excluded.push((id.to_owned(), Exclusion::QuotaExhausted));
                continue;
            }
            return Some(idx);
        }
        None
    }
}

impl std::fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("policy", &self.policy.name())
            .field("affinity", &self.affinity.len())
            .finish_non_exhaustive()
    }
}

/// Reason a provider cannot serve the request right now, if any
fn ineligibility(profile: &ComplexityProfile, descriptor: &ProviderDescriptor, available: bool) -> Option<Exclusion> {
    if !available {
        return Some(Exclusion::CircuitOpen);
    }

    let limit = descriptor.limits.max_context_tokens;
    if profile.required_context_tokens > limit {
        return Some(Exclusion::ContextTooSmall {
            required: profile.required_context_tokens,
            limit,
        });
    }

    if let (Some(required), Some(limit)) = (profile.max_output_tokens, descriptor.limits.max_output_tokens)
        && required > limit
    {
        return Some(Exclusion::OutputTooSmall { required, limit });
    }

    None
}

fn no_eligible(excluded: Vec<(String, Exclusion)>) -> RoutingError {
    tracing::warn!(excluded = excluded.len(), "no eligible provider");
    RoutingError::NoEligibleProvider { excluded }
}
