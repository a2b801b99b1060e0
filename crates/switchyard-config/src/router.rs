use serde::Deserialize;

/// Routing, capacity and quality policy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Complexity classifier heuristics
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Candidate ranking policy
    #[serde(default)]
    pub ranking: RankingConfig,
    /// Rolling window and circuit breaker settings
    #[serde(default)]
    pub capacity: CapacityConfig,
    /// Quality gate settings
    #[serde(default)]
    pub quality: QualityConfig,
    /// Escalation budget
    #[serde(default)]
    pub escalation: EscalationConfig,
}

/// Heuristics used to mark a request as complex
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Estimated input tokens above which a request is complex
    #[serde(default = "default_complex_token_threshold")]
    pub complex_token_threshold: usize,
    /// Domain tags that mark a request as complex
    #[serde(default = "default_complex_domains")]
    pub complex_domains: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            complex_token_threshold: default_complex_token_threshold(),
            complex_domains: default_complex_domains(),
        }
    }
}

/// Built-in ranking policies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicyKind {
    /// Weighted blend of affinity, load and static priority
    #[default]
    Weighted,
    /// Static priority only
    Priority,
}

/// Candidate ranking configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankingConfig {
    /// Which ranking policy to use
    #[serde(default)]
    pub policy: RankingPolicyKind,
    /// Weight for staying on the provider that served the same session
    #[serde(default = "default_weight_affinity")]
    pub weight_affinity: f64,
    /// Weight for low current load
    #[serde(default = "default_weight_load")]
    pub weight_load: f64,
    /// Weight for configured static priority
    #[serde(default = "default_weight_priority")]
    pub weight_priority: f64,
    /// Weight for matching the provider kind to the task class: simple
    /// requests lean local, complex requests lean cloud
    #[serde(default = "default_weight_complexity")]
    pub weight_complexity: f64,
    /// Queue depth treated as fully loaded
    #[serde(default = "default_queue_ceiling")]
    pub queue_ceiling: u32,
    /// Latency in milliseconds treated as fully loaded
    #[serde(default = "default_latency_ceiling_ms")]
    pub latency_ceiling_ms: f64,
    /// Maximum remembered session affinities
    #[serde(default = "default_affinity_capacity")]
    pub affinity_capacity: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            policy: RankingPolicyKind::default(),
            weight_affinity: default_weight_affinity(),
            weight_load: default_weight_load(),
            weight_priority: default_weight_priority(),
            weight_complexity: default_weight_complexity(),
            queue_ceiling: default_queue_ceiling(),
            latency_ceiling_ms: default_latency_ceiling_ms(),
            affinity_capacity: default_affinity_capacity(),
        }
    }
}

/// Rolling window and circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapacityConfig {
    /// Age after which samples leave the rolling window (e.g. "60s")
    #[serde(default = "default_window")]
    pub window: String,
    /// Hard cap on samples kept per provider
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long an open circuit waits before admitting a probe (e.g. "30s")
    #[serde(default = "default_cooldown")]
    pub cooldown: String,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            max_samples: default_max_samples(),
            failure_threshold: default_failure_threshold(),
            cooldown: default_cooldown(),
        }
    }
}

/// Built-in quality scorers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    /// Length, hedging and truncation heuristics
    #[default]
    Heuristic,
    /// Provider-reported confidence, heuristic when absent
    ProviderConfidence,
    /// Accept every response
    AlwaysAccept,
    /// Escalate every response
    AlwaysEscalate,
}

/// Quality gate configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityConfig {
    /// Scoring implementation
    #[serde(default)]
    pub scorer: ScorerKind,
    /// Minimum score to accept a response (0.0 to 1.0)
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            scorer: ScorerKind::default(),
            threshold: default_threshold(),
        }
    }
}

/// Escalation budget configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationConfig {
    /// Maximum re-routes after the first attempt
    #[serde(default = "default_max_escalations")]
    pub max_escalations: u32,
    /// Let provider errors walk the fallback chain beyond the escalation budget
    #[serde(default = "default_true")]
    pub fallback_on_error: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_escalations: default_max_escalations(),
            fallback_on_error: true,
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_complex_token_threshold() -> usize {
    2000
}

fn default_complex_domains() -> Vec<String> {
    ["code", "math", "legal", "medical", "analysis"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

#[allow(clippy::missing_const_for_fn)]
fn default_weight_affinity() -> f64 {
    0.3
}

#[allow(clippy::missing_const_for_fn)]
fn default_weight_load() -> f64 {
    0.4
}

#[allow(clippy::missing_const_for_fn)]
fn default_weight_priority() -> f64 {
    0.3
}

#[allow(clippy::missing_const_for_fn)]
fn default_weight_complexity() -> f64 {
    0.2
}

#[allow(clippy::missing_const_for_fn)]
fn default_queue_ceiling() -> u32 {
    16
}

#[allow(clippy::missing_const_for_fn)]
fn default_latency_ceiling_ms() -> f64 {
    10_000.0
}

#[allow(clippy::missing_const_for_fn)]
fn default_affinity_capacity() -> usize {
    10_000
}

fn default_window() -> String {
    "60s".to_owned()
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_samples() -> usize {
    256
}

#[allow(clippy::missing_const_for_fn)]
fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown() -> String {
    "30s".to_owned()
}

#[allow(clippy::missing_const_for_fn)]
fn default_threshold() -> f64 {
    0.5
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_escalations() -> u32 {
    2
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}
