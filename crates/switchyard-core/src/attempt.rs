use std::time::Duration;

use jiff::Timestamp;
use serde::Serialize;
use switchyard_config::ProviderKind;

use crate::error::ProviderError;
use crate::response::InferenceResponse;
use crate::routing::{DecisionReason, RoutingDecision};

/// One completed call to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceAttempt {
    /// 1-based attempt number within the request
    pub number: u32,
    /// Provider that was called
    pub provider_id: String,
    /// Local or cloud
    pub provider_kind: ProviderKind,
    /// Why the provider was chosen
    pub reason: DecisionReason,
    /// Wall-clock start
    pub started_at: Timestamp,
    /// Wall-clock end
    pub finished_at: Timestamp,
    /// Measured latency
    pub latency: Duration,
    /// Response or typed error
    pub outcome: Result<InferenceResponse, ProviderError>,
}

impl InferenceAttempt {
    pub const fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn response(&self) -> Option<&InferenceResponse> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ProviderError> {
        self.outcome.as_ref().err()
    }
}

/// Accept or escalate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    Escalate,
}

/// Outcome of the quality gate for one attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityVerdict {
    /// Accept or escalate
    pub verdict: Verdict,
    /// Score assigned by the scorer (0.0 to 1.0)
    pub score: f64,
    /// Threshold the score was compared against
    pub threshold: f64,
    /// Name of the scorer that produced the score
    pub scorer: String,
}

impl QualityVerdict {
    pub fn accepted(&self) -> bool {
        self.verdict == Verdict::Accept
    }
}

/// Everything that happened while serving one request, in order
///
/// Owned by the orchestrator; the routing engine only reads it.
#[derive(Debug, Clone, Default)]
pub struct RequestHistory {
    /// Routing decisions, one per routing step
    pub decisions: Vec<RoutingDecision>,
    /// Attempts, one per decision
    pub attempts: Vec<InferenceAttempt>,
    /// Verdicts for attempts that produced a response
    pub verdicts: Vec<(u32, QualityVerdict)>,
}

impl RequestHistory {
    /// Whether a provider was already called for this request
    pub fn tried(&self, provider_id: &str) -> bool {
        self.attempts.iter().any(|a| a.provider_id == provider_id)
    }

    pub fn last_decision(&self) -> Option<&RoutingDecision> {
        self.decisions.last()
    }

    pub fn last_attempt(&self) -> Option<&InferenceAttempt> {
        self.attempts.last()
    }

    /// Highest scoring response seen so far, with its score
    pub fn best_response(&self) -> Option<(&InferenceResponse, f64)> {
        self.verdicts
            .iter()
            .filter_map(|(number, verdict)| {
                self.attempts
                    .iter()
                    .find(|a| a.number == *number)
                    .and_then(InferenceAttempt::response)
                    .map(|response| (response, verdict.score))
            })
            .fold(None, |best: Option<(&InferenceResponse, f64)>, candidate| match best {
                Some(current) if current.1 >= candidate.1 => Some(current),
                _ => Some(candidate),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(number: u32, provider: &str, outcome: Result<InferenceResponse, ProviderError>) -> InferenceAttempt {
        let now = Timestamp::now();
        InferenceAttempt {
            number,
            provider_id: provider.to_owned(),
            provider_kind: ProviderKind::Local,
            reason: DecisionReason::Ranked,
            started_at: now,
            finished_at: now,
            latency: Duration::from_millis(5),
            outcome,
        }
    }

    fn verdict(score: f64) -> QualityVerdict {
        QualityVerdict {
            verdict: Verdict::Escalate,
            score,
            threshold: 0.9,
            scorer: "test".to_owned(),
        }
    }

    #[test]
    fn best_response_prefers_highest_score() {
        let mut history = RequestHistory::default();
        history
            .attempts
            .push(attempt(1, "a", Ok(InferenceResponse::text("a", "m", "first"))));
        history.attempts.push(attempt(
            2,
            "b",
            Err(ProviderError::Unavailable("down".to_owned())),
        ));
        history
            .attempts
            .push(attempt(3, "c", Ok(InferenceResponse::text("c", "m", "third"))));
        history.verdicts.push((1, verdict(0.4)));
        history.verdicts.push((3, verdict(0.7)));

        let (best, score) = history.best_response().unwrap();
        assert_eq!(best.text, "third");
        assert!((score - 0.7).abs() < f64::EPSILON);
        assert!(history.tried("b"));
        assert!(!history.tried("d"));
    }

    #[test]
    fn empty_history_has_no_best() {
        assert!(RequestHistory::default().best_response().is_none());
    }
}
