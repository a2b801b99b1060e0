//! JSON rendering of routing results for stdout

use serde_json::{Value, json};
use switchyard_core::{ComplexityProfile, InferenceAttempt, RoutingDecision};
use switchyard_orchestrator::{ErrorEnvelope, Outcome};

pub fn decision(decision: &RoutingDecision) -> Value {
    json!({
        "primary": decision.primary_id(),
        "kind": decision.primary.kind.to_string(),
        "reason": decision.reason.as_str(),
        "fallback": decision.fallback_ids(),
        "excluded": decision
            .excluded
            .iter()
            .map(|(id, why)| json!({ "provider": id, "exclusion": why }))
            .collect::<Vec<_>>(),
    })
}

pub fn preview(profile: &ComplexityProfile, routed: &RoutingDecision) -> Value {
    json!({
        "profile": profile,
        "decision": decision(routed),
    })
}

fn attempt(attempt: &InferenceAttempt) -> Value {
    json!({
        "number": attempt.number,
        "provider": attempt.provider_id,
        "reason": attempt.reason.as_str(),
        "latency_ms": attempt.latency.as_millis(),
        "ok": attempt.succeeded(),
        "error": attempt.error().map(ToString::to_string),
    })
}

pub fn outcome(outcome: &Outcome) -> Value {
    json!({
        "request_id": outcome.request_id,
        "response": outcome.response,
        "verdict": outcome.verdict,
        "profile": outcome.profile,
        "decisions": outcome.history.decisions.iter().map(decision).collect::<Vec<_>>(),
        "attempts": outcome.history.attempts.iter().map(attempt).collect::<Vec<_>>(),
        "states": outcome.states,
    })
}

pub fn failure(envelope: &ErrorEnvelope) -> Value {
    json!({
        "request_id": envelope.request_id,
        "error": {
            "kind": envelope.kind,
            "message": envelope.message,
        },
        "best_response": envelope.best_response,
        "decisions": envelope.decisions.iter().map(decision).collect::<Vec<_>>(),
        "attempts": envelope.attempts.iter().map(attempt).collect::<Vec<_>>(),
        "states": envelope.states,
    })
}
