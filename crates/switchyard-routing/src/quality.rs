//! Response quality gate
//!
//! A pluggable scorer rates each response between 0.0 and 1.0; the gate
//! accepts when the score reaches the configured threshold.

use std::sync::Arc;

use switchyard_config::{QualityConfig, ScorerKind};
use switchyard_core::{FinishReason, InferenceRequest, InferenceResponse, QualityVerdict, Verdict};

use crate::classifier::estimate_tokens;

/// Phrases that signal the model is unsure of its answer
const HEDGING_PHRASES: &[&str] = &[
    "i'm not sure",
    "i am not sure",
    "i don't know",
    "i'm uncertain",
    "it's unclear",
    "i cannot",
    "i can't determine",
    "i may be wrong",
    "this might not be",
];

/// Trait for response scoring implementations
#[allow(clippy::unnecessary_literal_bound)]
pub trait QualityScorer: Send + Sync {
    /// Score a response to a request, 0.0 (unusable) to 1.0 (excellent)
    fn score(&self, request: &InferenceRequest, response: &InferenceResponse) -> f64;

    /// Human-readable scorer name
    fn name(&self) -> &str;
}

/// Length, hedging and truncation heuristics
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

#[allow(clippy::unnecessary_literal_bound)]
impl QualityScorer for HeuristicScorer {
    #[allow(clippy::cast_precision_loss)]
    fn score(&self, request: &InferenceRequest, response: &InferenceResponse) -> f64 {
        let text = response.text.trim();
        if text.is_empty() {
            return 0.0;
        }

        let mut score: f64 = 0.8;

        let words = text.split_whitespace().count();
        if let Some(expected) = request.expected_output_tokens.filter(|e| *e > 0) {
            let produced = estimate_tokens(text) as f64;
            let ratio = produced / f64::from(expected);
            if ratio < 0.25 {
                score -= 0.3;
            } else if ratio < 0.5 {
                score -= 0.15;
            }
        } else if estimate_tokens(&request.full_text()) > 500 && words < 20 {
            score -= 0.3;
        }

        let lower = text.to_lowercase();
        for phrase in HEDGING_PHRASES {
            if lower.contains(phrase) {
                score -= 0.15;
            }
        }

        match response.finish_reason {
            Some(FinishReason::Length) => score -= 0.2,
            Some(FinishReason::ContentFilter) => score -= 0.5,
            _ => {}
        }

        score.clamp(0.0, 1.0)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Provider-reported confidence, heuristic when absent
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderConfidenceScorer;

#[allow(clippy::unnecessary_literal_bound)]
impl QualityScorer for ProviderConfidenceScorer {
    fn score(&self, request: &InferenceRequest, response: &InferenceResponse) -> f64 {
        response
            .confidence
            .filter(|c| c.is_finite())
            .map_or_else(|| HeuristicScorer.score(request, response), |c| c.clamp(0.0, 1.0))
    }

    fn name(&self) -> &str {
        "provider_confidence"
    }
}

/// Accept every response
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAccept;

#[allow(clippy::unnecessary_literal_bound)]
impl QualityScorer for AlwaysAccept {
    fn score(&self, _request: &InferenceRequest, _response: &InferenceResponse) -> f64 {
        1.0
    }

    fn name(&self) -> &str {
        "always_accept"
    }
}

/// Escalate every response
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysEscalate;

#[allow(clippy::unnecessary_literal_bound)]
impl QualityScorer for AlwaysEscalate {
    fn score(&self, _request: &InferenceRequest, _response: &InferenceResponse) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "always_escalate"
    }
}

/// Built-in scorer for a config selection
pub fn scorer_for(kind: ScorerKind) -> Arc<dyn QualityScorer> {
    match kind {
        ScorerKind::Heuristic => Arc::new(HeuristicScorer),
        ScorerKind::ProviderConfidence => Arc::new(ProviderConfidenceScorer),
        ScorerKind::AlwaysAccept => Arc::new(AlwaysAccept),
        ScorerKind::AlwaysEscalate => Arc::new(AlwaysEscalate),
    }
}

/// Scorer plus acceptance threshold
#[derive(Clone)]
pub struct QualityGate {
    scorer: Arc<dyn QualityScorer>,
    threshold: f64,
}

impl QualityGate {
    pub fn new(scorer: Arc<dyn QualityScorer>, threshold: f64) -> Self {
        Self {
            scorer,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &QualityConfig) -> Self {
        Self::new(scorer_for(config.scorer), config.threshold)
    }

    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }

    /// Score a response and compare against the threshold
    pub fn evaluate(&self, request: &InferenceRequest, response: &InferenceResponse) -> QualityVerdict {
        let score = self.scorer.score(request, response);
        let verdict = if score >= self.threshold {
            Verdict::Accept
        } else {
            Verdict::Escalate
        };

        tracing::debug!(
            request_id = %request.id,
            provider = %response.provider_id,
            scorer = self.scorer.name(),
            score,
            threshold = self.threshold,
            ?verdict,
            "response evaluated"
        );

        QualityVerdict {
            verdict,
            score,
            threshold: self.threshold,
            scorer: self.scorer.name().to_owned(),
        }
    }
}

impl std::fmt::Debug for QualityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityGate")
            .field("scorer", &self.scorer.name())
            .field("threshold", &self.threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(text: &str) -> InferenceResponse {
        InferenceResponse::text("p", "m", text)
    }

    fn gate(kind: ScorerKind, threshold: f64) -> QualityGate {
        QualityGate::from_config(&QualityConfig {
            scorer: kind,
            threshold,
        })
    }

    #[test]
    fn confident_response_is_accepted() {
        let request = InferenceRequest::from_prompt("What is 6 times 7?");
        let verdict = gate(ScorerKind::Heuristic, 0.5).evaluate(&request, &response("The answer is 42."));
        assert!(verdict.accepted());
        assert_eq!(verdict.scorer, "heuristic");
    }

    #[test]
    fn hedging_response_escalates() {
        let request = InferenceRequest::from_prompt("Who wrote this?");
        let verdict = gate(ScorerKind::Heuristic, 0.6).evaluate(
            &request,
            &response("I'm not sure, it's unclear who wrote it and I may be wrong."),
        );
        assert_eq!(verdict.verdict, Verdict::Escalate);
    }

    #[test]
    fn empty_response_scores_zero() {
        let request = InferenceRequest::from_prompt("hello");
        let verdict = gate(ScorerKind::Heuristic, 0.1).evaluate(&request, &response("   "));
        assert!(verdict.score.abs() < f64::EPSILON);
        assert!(!verdict.accepted());
    }

    #[test]
    fn truncated_response_is_penalized() {
        let request = InferenceRequest::from_prompt("Tell me about rivers");
        let full = HeuristicScorer.score(&request, &response("Rivers carry water to the sea."));
        let cut = HeuristicScorer.score(
            &request,
            &response("Rivers carry water to the sea.").with_finish_reason(FinishReason::Length),
        );
        assert!(cut < full);
    }

    #[test]
    fn short_answer_against_expected_length_is_penalized() {
        let mut request = InferenceRequest::from_prompt("Write a detailed essay");
        request.expected_output_tokens = Some(800);
        let score = HeuristicScorer.score(&request, &response("Essays are nice."));
        assert!(score < 0.6);
    }

    #[test]
    fn provider_confidence_wins_when_present() {
        let request = InferenceRequest::from_prompt("hi");
        let low = response("Hello there!").with_confidence(0.2);
        assert!((ProviderConfidenceScorer.score(&request, &low) - 0.2).abs() < f64::EPSILON);

        let absent = response("Hello there!");
        assert!(
            (ProviderConfidenceScorer.score(&request, &absent) - HeuristicScorer.score(&request, &absent)).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn fixed_scorers_ignore_content() {
        let request = InferenceRequest::from_prompt("hi");
        assert!(gate(ScorerKind::AlwaysAccept, 1.0).evaluate(&request, &response("")).accepted());
        assert!(!gate(ScorerKind::AlwaysEscalate, 0.0001).evaluate(&request, &response("great")).accepted());
    }
}
