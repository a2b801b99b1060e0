use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::descriptor::ProviderDescriptor;

/// Coarse task class derived by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskClass {
    Simple,
    Complex,
}

/// How much the classifier trusts its own verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Normal,
    /// Empty or unintelligible input
    Low,
}

/// A signal that marked the request complex
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum ComplexitySignal {
    /// Estimated input exceeds the token threshold
    LongInput { tokens: usize },
    /// Caller flagged the data as private
    PrivacyFlag,
    /// A configured complex domain tag is present
    ComplexDomain { tag: String },
}

/// Read-only summary of a request, computed once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplexityProfile {
    /// Estimated input tokens
    pub estimated_tokens: usize,
    /// Data must stay on local providers
    pub privacy_sensitive: bool,
    /// Simple or complex
    pub task_class: TaskClass,
    /// Classifier confidence
    pub confidence: Confidence,
    /// Signals that fired, in evaluation order
    pub signals: Vec<ComplexitySignal>,
    /// Supplied and detected domain tags, sorted and deduplicated
    pub domain_tags: Vec<String>,
    /// Context window the request needs (input plus reserved output)
    pub required_context_tokens: u32,
    /// Requested output length
    pub max_output_tokens: Option<u32>,
    /// Key for keeping related requests on one provider
    pub affinity_key: Option<String>,
}

impl ComplexityProfile {
    pub fn is_complex(&self) -> bool {
        self.task_class == TaskClass::Complex
    }
}

/// Why the primary provider of a decision was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Best ranked candidate
    Ranked,
    /// Best ranked candidate, driven by session affinity
    Affinity,
    /// Best ranked local candidate of a privacy-restricted request
    PrivacyRestricted,
    /// Next entry of the previous decision's fallback chain
    Fallback,
    /// Candidates re-ranked after the previous chain was exhausted
    Reranked,
}

impl DecisionReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ranked => "ranked",
            Self::Affinity => "affinity",
            Self::PrivacyRestricted => "privacy_restricted",
            Self::Fallback => "fallback",
            Self::Reranked => "reranked",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a candidate was filtered out before ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Exclusion {
    /// Cloud provider for a privacy-sensitive request
    CloudForbidden,
    /// Circuit breaker is open or a probe is already in flight
    CircuitOpen,
    /// Context window too small
    ContextTooSmall { required: u32, limit: u32 },
    /// Output limit too small
    OutputTooSmall { required: u32, limit: u32 },
    /// Per-minute request or token quota exhausted
    QuotaExhausted,
    /// Already attempted for this request
    AlreadyTried,
}

/// Output of the routing engine, immutable once produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Chosen provider
    pub primary: Arc<ProviderDescriptor>,
    /// Why it was chosen
    pub reason: DecisionReason,
    /// Ranked alternates, best first
    pub fallback: Vec<Arc<ProviderDescriptor>>,
    /// Filtered candidates with the reason each was dropped
    pub excluded: Vec<(String, Exclusion)>,
}

impl RoutingDecision {
    pub fn primary_id(&self) -> &str {
        &self.primary.id
    }

    pub fn fallback_ids(&self) -> Vec<&str> {
        self.fallback.iter().map(|d| d.id.as_str()).collect()
    }

    /// Exclusion recorded for a provider, if it was filtered
    pub fn exclusion(&self, provider_id: &str) -> Option<&Exclusion> {
        self.excluded
            .iter()
            .find(|(id, _)| id == provider_id)
            .map(|(_, reason)| reason)
    }
}
