//! Candidate ranking policies
//!
//! A policy assigns each eligible provider a score; the engine sorts by
//! score descending and breaks ties by provider id.

use std::collections::HashMap;
use std::sync::Arc;

use switchyard_config::{RankingConfig, RankingPolicyKind};
use switchyard_core::{ComplexityProfile, ProviderDescriptor, ProviderState};

/// Everything a policy may look at for one candidate
#[derive(Debug, Clone, Copy)]
pub struct RankInput<'a> {
    /// Static description
    pub descriptor: &'a Arc<ProviderDescriptor>,
    /// Live state snapshot
    pub state: &'a ProviderState,
    /// Classification of the request being routed
    pub profile: &'a ComplexityProfile,
    /// This provider last served the request's affinity key
    pub affinity: bool,
    /// Highest static priority among the candidates
    pub max_priority: u32,
}

/// Trait for ranking policy implementations
#[allow(clippy::unnecessary_literal_bound)]
pub trait RankingPolicy: Send + Sync {
    /// Score a candidate, higher is better
    fn score(&self, input: &RankInput<'_>) -> f64;

    /// Human-readable policy name
    fn name(&self) -> &str;
}

/// Weighted blend of affinity, load, static priority and task fit
///
/// Task fit is 1.0 when the provider kind suits the task class (local for
/// simple requests, cloud for complex ones) and 0.0 otherwise.
#[derive(Debug, Clone)]
pub struct WeightedRanking {
    weight_affinity: f64,
    weight_load: f64,
    weight_priority: f64,
    weight_complexity: f64,
    queue_ceiling: f64,
    latency_ceiling_ms: f64,
}

impl WeightedRanking {
    pub fn new(config: &RankingConfig) -> Self {
        Self {
            weight_affinity: config.weight_affinity,
            weight_load: config.weight_load,
            weight_priority: config.weight_priority,
            weight_complexity: config.weight_complexity,
            queue_ceiling: f64::from(config.queue_ceiling.max(1)),
            latency_ceiling_ms: if config.latency_ceiling_ms > 0.0 {
                config.latency_ceiling_ms
            } else {
                1.0
            },
        }
    }

    /// Load in `0.0..=1.0`, half queue depth and half latency
    fn load(&self, state: &ProviderState) -> f64 {
        let queue = (f64::from(state.queue_depth) / self.queue_ceiling).min(1.0);
        let latency = state
            .mean_latency_ms
            .map_or(0.0, |ms| (ms / self.latency_ceiling_ms).min(1.0));
        0.5f64.mul_add(queue, 0.5 * latency)
    }
}

#[allow(clippy::unnecessary_literal_bound)]
impl RankingPolicy for WeightedRanking {
    fn score(&self, input: &RankInput<'_>) -> f64 {
        let affinity = if input.affinity { 1.0 } else { 0.0 };
        let priority = if input.max_priority == 0 {
            0.0
        } else {
            f64::from(input.descriptor.priority) / f64::from(input.max_priority)
        };
        let load_score = 1.0 - self.load(input.state);
        let fit = if input.profile.is_complex() == input.descriptor.is_local() {
            0.0
        } else {
            1.0
        };

        self.weight_affinity.mul_add(
            affinity,
            self.weight_load.mul_add(
                load_score,
                self.weight_priority.mul_add(priority, self.weight_complexity * fit),
            ),
        )
    }

    fn name(&self) -> &str {
        "weighted"
    }
}

/// Static priority only
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityRanking;

#[allow(clippy::unnecessary_literal_bound)]
impl RankingPolicy for PriorityRanking {
    fn score(&self, input: &RankInput<'_>) -> f64 {
        f64::from(input.descriptor.priority)
    }

    fn name(&self) -> &str {
        "priority"
    }
}

/// A scored candidate
#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    pub descriptor: &'a Arc<ProviderDescriptor>,
    pub score: f64,
    pub affinity: bool,
}

/// Sort candidates by score descending, then by id ascending
pub fn rank<'a>(policy: &dyn RankingPolicy, inputs: &[RankInput<'a>]) -> Vec<Ranked<'a>> {
    let mut scored: Vec<Ranked<'a>> = inputs
        .iter()
        .map(|input| Ranked {
            descriptor: input.descriptor,
            score: policy.score(input),
            affinity: input.affinity,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.descriptor.id.cmp(&b.descriptor.id))
    });
    scored
}

/// Registry of available ranking policies
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<dyn RankingPolicy>>,
}

impl PolicyRegistry {
    /// Build from config with built-in policies
    pub fn from_config(config: &RankingConfig) -> Self {
        let mut policies: HashMap<String, Arc<dyn RankingPolicy>> = HashMap::new();
        policies.insert("weighted".to_owned(), Arc::new(WeightedRanking::new(config)));
        policies.insert("priority".to_owned(), Arc::new(PriorityRanking));
        Self { policies }
    }

    /// Register a custom policy
    pub fn register(&mut self, name: &str, policy: Arc<dyn RankingPolicy>) {
        self.policies.insert(name.to_owned(), policy);
    }

    /// Get a policy by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn RankingPolicy>> {
        self.policies.get(name).cloned()
    }

    /// Resolve the configured policy name
    pub const fn resolve_name(config: &RankingConfig) -> &'static str {
        match config.policy {
            RankingPolicyKind::Weighted => "weighted",
            RankingPolicyKind::Priority => "priority",
        }
    }
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}
