//! Request orchestration
//!
//! Drives one request through validation, classification, routing,
//! invocation and evaluation, re-routing on rejected responses and
//! provider errors until a response is accepted or the budget runs out.

use std::sync::Arc;
use std::time::Instant;

use jiff::Timestamp;
use switchyard_config::{ClassifierConfig, EscalationConfig, ProviderConfig, RouterConfig};
use switchyard_core::{
    ComplexityProfile, InferenceAttempt, InferenceRequest, InferenceResponse, ProviderError, QualityVerdict,
    RequestHistory, RoutingDecision,
};
use switchyard_provider::{CatalogError, CatalogSnapshot, ProviderCatalog};
use switchyard_routing::{QualityGate, RoutingEngine, classify};
use switchyard_telemetry::KeyValue;
use switchyard_telemetry::metrics::{RouterMetrics, record_duration};
use uuid::Uuid;

use crate::error::{ErrorEnvelope, OrchestratorError};
use crate::state::{RequestState, StateTrail};

/// Successful result of [`Orchestrator::handle`]
#[derive(Debug, Clone)]
pub struct Outcome {
    pub request_id: Uuid,
    /// Accepted response
    pub response: InferenceResponse,
    /// Verdict that accepted it
    pub verdict: QualityVerdict,
    pub profile: ComplexityProfile,
    /// Every decision, attempt and verdict in order
    pub history: RequestHistory,
    /// Visited states, `Validating` first and `Completed` last
    pub states: Vec<RequestState>,
}

/// Why an attempt did not complete the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escalation {
    /// Response scored below the threshold
    Score,
    /// Provider returned an error
    Error,
}

impl Escalation {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::Error => "provider_error",
        }
    }
}

/// Re-route allowance for one request
///
/// Score escalations are capped by `max_escalations`. With
/// `fallback_on_error`, provider errors may also walk the first decision's
/// fallback chain, so total re-routes never exceed
/// `max_escalations + fallback_len`.
#[derive(Debug)]
struct Budget {
    max_escalations: u32,
    fallback_on_error: bool,
    fallback_len: Option<u32>,
    escalations: u32,
    reroutes: u32,
}

impl Budget {
    const fn new(config: &EscalationConfig) -> Self {
        Self {
            max_escalations: config.max_escalations,
            fallback_on_error: config.fallback_on_error,
            fallback_len: None,
            escalations: 0,
            reroutes: 0,
        }
    }

    fn observe(&mut self, decision: &RoutingDecision) {
        if self.fallback_len.is_none() {
            self.fallback_len = Some(u32::try_from(decision.fallback.len()).unwrap_or(u32::MAX));
        }
    }

    fn reroute_cap(&self) -> u32 {
        let fallback = if self.fallback_on_error {
            self.fallback_len.unwrap_or(0)
        } else {
            0
        };
        self.max_escalations.saturating_add(fallback)
    }

    /// Consume one unit for a re-route; false when none is left
    fn spend(&mut self, cause: Escalation) -> bool {
        if self.reroutes >= self.reroute_cap() {
            return false;
        }
        if cause == Escalation::Score || !self.fallback_on_error {
            if self.escalations >= self.max_escalations {
                return false;
            }
            self.escalations += 1;
        }
        self.reroutes += 1;
        true
    }
}

/// Entry point for inference requests
pub struct Orchestrator {
    catalog: Arc<ProviderCatalog>,
    engine: RoutingEngine,
    gate: QualityGate,
    classifier: ClassifierConfig,
    escalation: EscalationConfig,
    metrics: RouterMetrics,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<ProviderCatalog>,
        engine: RoutingEngine,
        gate: QualityGate,
        classifier: ClassifierConfig,
        escalation: EscalationConfig,
    ) -> Self {
        Self {
            catalog,
            engine,
            gate,
            classifier,
            escalation,
            metrics: RouterMetrics::new(),
        }
    }

    /// Build the engine and gate from router config, sharing the catalog's monitor
    pub fn from_config(config: &RouterConfig, catalog: Arc<ProviderCatalog>) -> Self {
        let engine = RoutingEngine::from_config(config, Arc::clone(catalog.monitor()));
        Self::new(
            catalog,
            engine,
            QualityGate::from_config(&config.quality),
            config.classifier.clone(),
            config.escalation.clone(),
        )
    }

    pub const fn catalog(&self) -> &Arc<ProviderCatalog> {
        &self.catalog
    }

    pub const fn engine(&self) -> &RoutingEngine {
        &self.engine
    }

    /// Swap in a new provider set
    ///
    /// Affinity entries pointing at removed providers are dropped. Requests
    /// already in flight finish on the snapshot they started with.
    pub fn reload(&self, providers: &[ProviderConfig]) -> Result<u64, CatalogError> {
        let previous = self.catalog.snapshot();
        let version = self.catalog.reload(providers)?;
        let current = self.catalog.snapshot();

        for id in previous.provider_ids() {
            if current.pool().get(id).is_none() {
                self.engine.affinity().forget_provider(id);
            }
        }

        Ok(version)
    }

    /// Validate, classify and route a request without invoking a provider
    ///
    /// Admission is skipped: no quota is consumed and no probe slot is held.
    pub fn preview(
        &self,
        request: &InferenceRequest,
    ) -> Result<(ComplexityProfile, RoutingDecision), OrchestratorError> {
        validate(request)?;
        let profile = classify(request, &self.classifier);
        let snapshot = self.catalog.snapshot();
        let decision = self
            .engine
            .plan(&profile, snapshot.pool(), &RequestHistory::default())?;
        Ok((profile, decision))
    }

    /// Serve one request to completion
    ///
    /// The catalog snapshot is loaded once, so a concurrent reload never
    /// changes the provider set mid-request.
    pub async fn handle(&self, request: InferenceRequest) -> Result<Outcome, ErrorEnvelope> {
        let started = Instant::now();
        let mut trail = StateTrail::start(request.id);
        let mut history = RequestHistory::default();

        if let Err(error) = validate(&request) {
            return Err(self.fail(&request, trail, history, error));
        }

        trail.enter(RequestState::Classifying);
        let profile = classify(&request, &self.classifier);

        let snapshot = self.catalog.snapshot();
        let deadline = request.constraints.max_latency().map(|budget| started + budget);
        let mut budget = Budget::new(&self.escalation);

        loop {
            trail.enter(RequestState::Routing);
            let decision = match self.engine.route(&profile, snapshot.pool(), &history) {
                Ok(decision) => decision,
                Err(error) => return Err(self.fail(&request, trail, history, error.into())),
            };
            self.metrics.decisions.add(
                1,
                &[
                    KeyValue::new("provider", decision.primary.id.clone()),
                    KeyValue::new("reason", decision.reason.as_str()),
                ],
            );
            budget.observe(&decision);

            trail.enter(RequestState::Invoking);
            let number = u32::try_from(history.attempts.len()).unwrap_or(u32::MAX).saturating_add(1);
            let attempt = self.attempt(&request, &snapshot, &decision, deadline, number).await;
            history.decisions.push(decision);

            trail.enter(RequestState::Evaluating);
            let escalation = match &attempt.outcome {
                Ok(response) => {
                    let verdict = self.gate.evaluate(&request, response);
                    history.verdicts.push((attempt.number, verdict.clone()));
                    if verdict.accepted() {
                        let response = response.clone();
                        history.attempts.push(attempt);
                        return Ok(self.complete(request.id, trail, profile, history, response, verdict));
                    }
                    Escalation::Score
                }
                Err(_) => Escalation::Error,
            };
            history.attempts.push(attempt);

            let out_of_time = deadline.is_some_and(|d| Instant::now() >= d);
            if out_of_time || !budget.spend(escalation) {
                tracing::debug!(
                    request_id = %request.id,
                    out_of_time,
                    reroutes = budget.reroutes,
                    "escalation budget exhausted"
                );
                let error = exhausted(&history);
                return Err(self.fail(&request, trail, history, error));
            }

            trail.enter(RequestState::Escalating);
            self.metrics
                .escalations
                .add(1, &[KeyValue::new("cause", escalation.as_str())]);
            tracing::info!(
                request_id = %request.id,
                cause = escalation.as_str(),
                attempts = history.attempts.len(),
                "escalating to another provider"
            );
        }
    }

    async fn attempt(
        &self,
        request: &InferenceRequest,
        snapshot: &CatalogSnapshot,
        decision: &RoutingDecision,
        deadline: Option<Instant>,
        number: u32,
    ) -> InferenceAttempt {
        let descriptor = &decision.primary;
        let timeout = deadline.map_or(descriptor.timeout, |d| {
            descriptor.timeout.min(d.saturating_duration_since(Instant::now()))
        });

        let started_at = Timestamp::now();
        let start = Instant::now();
        let outcome = match snapshot.adapter(&descriptor.id) {
            Some(adapter) => adapter.invoke(request, descriptor, timeout).await,
            None => {
                self.engine.monitor().release(&descriptor.id);
                Err(ProviderError::Unavailable(format!("no adapter for provider '{}'", descriptor.id)))
            }
        };
        let latency = start.elapsed();

        record_duration(
            &self.metrics.attempt_duration,
            start,
            &[
                KeyValue::new("provider", descriptor.id.clone()),
                KeyValue::new("outcome", outcome.as_ref().map_or_else(ProviderError::kind, |_| "success")),
            ],
        );

        InferenceAttempt {
            number,
            provider_id: descriptor.id.clone(),
            provider_kind: descriptor.kind,
            reason: decision.reason,
            started_at,
            finished_at: Timestamp::now(),
            latency,
            outcome,
        }
    }

    fn complete(
        &self,
        request_id: Uuid,
        mut trail: StateTrail,
        profile: ComplexityProfile,
        history: RequestHistory,
        response: InferenceResponse,
        verdict: QualityVerdict,
    ) -> Outcome {
        trail.enter(RequestState::Completed);
        self.engine.record_success(&profile, &response.provider_id);
        self.metrics
            .requests
            .add(1, &[KeyValue::new("state", RequestState::Completed.as_str())]);

        tracing::info!(
            request_id = %request_id,
            provider = %response.provider_id,
            score = verdict.score,
            attempts = history.attempts.len(),
            "request completed"
        );

        Outcome {
            request_id,
            response,
            verdict,
            profile,
            history,
            states: trail.into_states(),
        }
    }

    fn fail(
        &self,
        request: &InferenceRequest,
        mut trail: StateTrail,
        history: RequestHistory,
        error: OrchestratorError,
    ) -> ErrorEnvelope {
        trail.enter(RequestState::Failed);
        let kind = error.kind();
        self.metrics.requests.add(
            1,
            &[
                KeyValue::new("state", RequestState::Failed.as_str()),
                KeyValue::new("error_kind", kind.as_str()),
            ],
        );

        tracing::warn!(
            request_id = %request.id,
            error_kind = %kind,
            error = %error,
            attempts = history.attempts.len(),
            "request failed"
        );

        ErrorEnvelope {
            kind,
            message: error.to_string(),
            request_id: request.id,
            best_response: history.best_response().map(|(response, _)| response.clone()),
            attempts: history.attempts,
            decisions: history.decisions,
            states: trail.into_states(),
            error,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("catalog", &self.catalog)
            .field("engine", &self.engine)
            .field("gate", &self.gate)
            .field("max_escalations", &self.escalation.max_escalations)
            .finish_non_exhaustive()
    }
}

/// Reject malformed requests before any provider is considered
fn validate(request: &InferenceRequest) -> Result<(), OrchestratorError> {
    let invalid = |message: &str| Err(OrchestratorError::InvalidRequest(message.to_owned()));

    if request.messages.is_empty() {
        return invalid("request has no messages");
    }
    if !request.has_content() {
        return invalid("request has no content");
    }

    let constraints = &request.constraints;
    if constraints.max_latency_ms == Some(0) {
        return invalid("max_latency_ms must be positive");
    }
    if constraints.context_tokens == Some(0) {
        return invalid("context_tokens must be positive");
    }
    if constraints.max_output_tokens == Some(0) {
        return invalid("max_output_tokens must be positive");
    }
    if let Some(temperature) = request.temperature
        && !(0.0..=2.0).contains(&temperature)
    {
        return invalid("temperature must be between 0 and 2");
    }

    Ok(())
}

/// Terminal error once no re-route is left
fn exhausted(history: &RequestHistory) -> OrchestratorError {
    if let Some((_, best_score)) = history.best_response() {
        return OrchestratorError::QualityUnattainable {
            attempts: history.attempts.len(),
            best_score,
        };
    }

    let last = history
        .attempts
        .iter()
        .rev()
        .find_map(InferenceAttempt::error)
        .cloned()
        .unwrap_or_else(|| ProviderError::Unavailable("no attempt was made".to_owned()));
    OrchestratorError::Provider(last)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use switchyard_config::ScorerKind;
    use switchyard_core::{
        BackendProtocol, CapabilityLimits, CircuitState, CredentialRef, DecisionReason, ErrorKind, Exclusion,
        Message, ProviderDescriptor, ProviderKind, RequestConstraints,
    };
    use tokio::task::JoinSet;
    use switchyard_provider::{Provider, SystemSecretResolver};
    use switchyard_routing::{CallOutcome, CapacityMonitor, CapacitySettings};
    use url::Url;

    use super::*;

    /// Provider that replays scripted outcomes, repeating the last one
    struct Fake {
        id: String,
        kind: ProviderKind,
        delay: Duration,
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl Fake {
        fn new(id: &str, kind: ProviderKind, script: Vec<Result<&str, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_owned(),
                kind,
                delay: Duration::ZERO,
                script: Mutex::new(script.into_iter().map(|r| r.map(str::to_owned)).collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn replying(id: &str, kind: ProviderKind, text: &str) -> Arc<Self> {
            Self::new(id, kind, vec![Ok(text)])
        }

        fn slow(id: &str, kind: ProviderKind, delay: Duration, text: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_owned(),
                kind,
                delay,
                script: Mutex::new(VecDeque::from([Ok(text.to_owned())])),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for Fake {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn complete(
            &self,
            _request: &InferenceRequest,
            descriptor: &ProviderDescriptor,
        ) -> Result<InferenceResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let next = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    script.front().cloned().unwrap()
                }
            };
            next.map(|text| InferenceResponse::text(descriptor.id.clone(), descriptor.model.clone(), text))
        }
    }

    fn descriptor(id: &str, kind: ProviderKind, priority: u32) -> ProviderDescriptor {
        ProviderDescriptor {
            id: id.to_owned(),
            kind,
            protocol: BackendProtocol::Openai,
            endpoint: Url::parse("http://localhost:8000/v1").unwrap(),
            model: format!("{id}-model"),
            credentials: CredentialRef::None,
            limits: CapabilityLimits {
                max_context_tokens: 8192,
                max_output_tokens: None,
                requests_per_minute: None,
                tokens_per_minute: None,
            },
            priority,
            timeout: Duration::from_secs(5),
        }
    }

    fn router(scorer: ScorerKind, max_escalations: u32) -> RouterConfig {
        let mut config = RouterConfig::default();
        config.quality.scorer = scorer;
        config.quality.threshold = 0.5;
        config.escalation.max_escalations = max_escalations;
        config.capacity.failure_threshold = 2;
        config
    }

    fn orchestrator(providers: Vec<(ProviderDescriptor, Arc<Fake>)>, config: &RouterConfig) -> Orchestrator {
        let monitor = Arc::new(CapacityMonitor::new(
            CapacitySettings::from_config(&config.capacity).unwrap(),
        ));
        let entries = providers
            .into_iter()
            .map(|(d, p)| (d, p as Arc<dyn Provider>))
            .collect();
        let snapshot = CatalogSnapshot::from_parts(1, entries, &monitor).unwrap();
        let catalog = ProviderCatalog::from_snapshot(snapshot, monitor, Arc::new(SystemSecretResolver));
        Orchestrator::from_config(config, Arc::new(catalog))
    }

    fn trip(orchestrator: &Orchestrator, provider: &str) {
        for _ in 0..2 {
            orchestrator
                .engine()
                .monitor()
                .record(provider, CallOutcome::Failure, Duration::from_millis(1));
        }
    }

    #[tokio::test]
    async fn single_local_provider_visits_each_state_once() {
        let local = Fake::replying("local", ProviderKind::Local, "Paris is the capital of France.");
        let orchestrator = orchestrator(
            vec![(descriptor("local", ProviderKind::Local, 1), Arc::clone(&local))],
            &router(ScorerKind::AlwaysAccept, 2),
        );

        let outcome = orchestrator
            .handle(InferenceRequest::from_prompt("What is the capital of France?"))
            .await
            .unwrap();

        assert_eq!(
            outcome.states,
            vec![
                RequestState::Validating,
                RequestState::Classifying,
                RequestState::Routing,
                RequestState::Invoking,
                RequestState::Evaluating,
                RequestState::Completed,
            ]
        );
        assert_eq!(outcome.history.attempts.len(), 1);
        assert_eq!(outcome.history.decisions.len(), 1);
        assert_eq!(outcome.response.provider_id, "local");
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn open_local_circuit_routes_to_cloud() {
        let local = Fake::replying("local", ProviderKind::Local, "local answer");
        let cloud = Fake::replying("cloud", ProviderKind::Cloud, "cloud answer");
        let orchestrator = orchestrator(
            vec![
                (descriptor("local", ProviderKind::Local, 10), Arc::clone(&local)),
                (descriptor("cloud", ProviderKind::Cloud, 1), Arc::clone(&cloud)),
            ],
            &router(ScorerKind::AlwaysAccept, 2),
        );
        trip(&orchestrator, "local");

        let outcome = orchestrator
            .handle(InferenceRequest::from_prompt("hello"))
            .await
            .unwrap();

        let decision = &outcome.history.decisions[0];
        assert_eq!(decision.primary_id(), "cloud");
        assert_eq!(decision.exclusion("local"), Some(&Exclusion::CircuitOpen));
        assert!(!decision.fallback_ids().contains(&"local"));
        assert_eq!(local.calls(), 0);
        assert_eq!(outcome.response.text, "cloud answer");
    }

    #[tokio::test]
    async fn cap_of_one_with_rejecting_gate_fails_after_two_decisions() {
        let orchestrator = orchestrator(
            vec![
                (
                    descriptor("a", ProviderKind::Local, 3),
                    Fake::replying("a", ProviderKind::Local, "first"),
                ),
                (
                    descriptor("b", ProviderKind::Local, 2),
                    Fake::replying("b", ProviderKind::Local, "second"),
                ),
                (
                    descriptor("c", ProviderKind::Cloud, 1),
                    Fake::replying("c", ProviderKind::Cloud, "third"),
                ),
            ],
            &router(ScorerKind::AlwaysEscalate, 1),
        );

        let envelope = orchestrator
            .handle(InferenceRequest::from_prompt("hello"))
            .await
            .unwrap_err();

        assert_eq!(envelope.kind, ErrorKind::QualityUnattainable);
        assert_eq!(envelope.decisions.len(), 2);
        assert_eq!(envelope.attempts.len(), 2);
        assert!(envelope.best_response.is_some());
        assert_eq!(envelope.states.last(), Some(&RequestState::Failed));
        assert_eq!(envelope.decisions[1].reason, DecisionReason::Fallback);
    }

    #[tokio::test]
    async fn rejecting_gate_terminates_within_cap_plus_one_decisions() {
        for cap in 0..5 {
            let orchestrator = orchestrator(
                vec![
                    (
                        descriptor("a", ProviderKind::Local, 2),
                        Fake::replying("a", ProviderKind::Local, "a"),
                    ),
                    (
                        descriptor("b", ProviderKind::Cloud, 1),
                        Fake::replying("b", ProviderKind::Cloud, "b"),
                    ),
                ],
                &router(ScorerKind::AlwaysEscalate, cap),
            );

            let envelope = orchestrator
                .handle(InferenceRequest::from_prompt("hello"))
                .await
                .unwrap_err();
            assert_eq!(envelope.kind, ErrorKind::QualityUnattainable);
            assert_eq!(envelope.decisions.len(), cap as usize + 1, "cap {cap}");
            let routing_steps = envelope
                .states
                .iter()
                .filter(|s| **s == RequestState::Routing)
                .count();
            assert_eq!(routing_steps, cap as usize + 1);
        }
    }

    #[tokio::test]
    async fn empty_request_is_invalid() {
        let local = Fake::replying("local", ProviderKind::Local, "unused");
        let orchestrator = orchestrator(
            vec![(descriptor("local", ProviderKind::Local, 1), Arc::clone(&local))],
            &router(ScorerKind::AlwaysAccept, 2),
        );

        let envelope = orchestrator
            .handle(InferenceRequest::new(vec![Message::user("   ")]))
            .await
            .unwrap_err();
        assert_eq!(envelope.kind, ErrorKind::InvalidRequest);
        assert_eq!(envelope.states, vec![RequestState::Validating, RequestState::Failed]);

        let envelope = orchestrator
            .handle(InferenceRequest::new(Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(envelope.kind, ErrorKind::InvalidRequest);
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn zero_limits_are_invalid() {
        let orchestrator = orchestrator(
            vec![(
                descriptor("local", ProviderKind::Local, 1),
                Fake::replying("local", ProviderKind::Local, "unused"),
            )],
            &router(ScorerKind::AlwaysAccept, 2),
        );

        let request = InferenceRequest::from_prompt("hello").with_constraints(RequestConstraints {
            max_output_tokens: Some(0),
            ..RequestConstraints::default()
        });
        let envelope = orchestrator.handle(request).await.unwrap_err();
        assert_eq!(envelope.kind, ErrorKind::InvalidRequest);
        assert!(envelope.message.contains("max_output_tokens"));
    }

    #[tokio::test]
    async fn private_request_without_local_provider_is_not_routed() {
        let cloud = Fake::replying("cloud", ProviderKind::Cloud, "leaked");
        let orchestrator = orchestrator(
            vec![(descriptor("cloud", ProviderKind::Cloud, 1), Arc::clone(&cloud))],
            &router(ScorerKind::AlwaysAccept, 2),
        );

        let envelope = orchestrator
            .handle(InferenceRequest::from_prompt("my medical record").with_privacy(true))
            .await
            .unwrap_err();

        assert_eq!(envelope.kind, ErrorKind::NoEligibleProvider);
        assert_eq!(
            envelope.states,
            vec![
                RequestState::Validating,
                RequestState::Classifying,
                RequestState::Routing,
                RequestState::Failed,
            ]
        );
        assert!(envelope.attempts.is_empty());
        assert_eq!(cloud.calls(), 0);
    }

    #[tokio::test]
    async fn provider_error_walks_fallback_chain() {
        let local = Fake::new(
            "local",
            ProviderKind::Local,
            vec![Err(ProviderError::Upstream {
                status: 503,
                message: "overloaded".to_owned(),
            })],
        );
        let cloud = Fake::replying("cloud", ProviderKind::Cloud, "cloud answer");
        let orchestrator = orchestrator(
            vec![
                (descriptor("local", ProviderKind::Local, 10), Arc::clone(&local)),
                (descriptor("cloud", ProviderKind::Cloud, 1), Arc::clone(&cloud)),
            ],
            &router(ScorerKind::AlwaysAccept, 0),
        );

        let outcome = orchestrator
            .handle(InferenceRequest::from_prompt("hello"))
            .await
            .unwrap();

        assert_eq!(outcome.response.provider_id, "cloud");
        assert_eq!(outcome.history.attempts.len(), 2);
        assert!(!outcome.history.attempts[0].succeeded());
        assert_eq!(outcome.history.attempts[1].reason, DecisionReason::Fallback);
        assert!(outcome.states.contains(&RequestState::Escalating));
    }

    #[tokio::test]
    async fn errors_spend_escalation_budget_when_fallback_is_disabled() {
        let failing = || {
            Fake::new(
                "x",
                ProviderKind::Local,
                vec![Err(ProviderError::Unavailable("connection refused".to_owned()))],
            )
        };
        let mut config = router(ScorerKind::AlwaysAccept, 0);
        config.escalation.fallback_on_error = false;
        let orchestrator = orchestrator(
            vec![
                (descriptor("a", ProviderKind::Local, 2), failing()),
                (descriptor("b", ProviderKind::Local, 1), failing()),
            ],
            &config,
        );

        let envelope = orchestrator
            .handle(InferenceRequest::from_prompt("hello"))
            .await
            .unwrap_err();

        assert_eq!(envelope.kind, ErrorKind::ProviderError);
        assert_eq!(envelope.attempts.len(), 1);
        assert!(envelope.best_response.is_none());
        assert!(envelope.message.contains("connection refused"));
    }

    #[tokio::test]
    async fn attempt_timeout_respects_latency_budget() {
        let slow = Fake::slow("slow", ProviderKind::Local, Duration::from_secs(5), "late");
        let orchestrator = orchestrator(
            vec![(descriptor("slow", ProviderKind::Local, 1), slow)],
            &router(ScorerKind::AlwaysAccept, 2),
        );

        let request = InferenceRequest::from_prompt("hello").with_constraints(RequestConstraints {
            max_latency_ms: Some(50),
            ..RequestConstraints::default()
        });
        let started = Instant::now();
        let envelope = orchestrator.handle(request).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(envelope.kind, ErrorKind::ProviderError);
        assert_eq!(envelope.attempts.len(), 1);
        assert!(matches!(envelope.attempts[0].error(), Some(ProviderError::Timeout { .. })));
    }

    #[tokio::test]
    async fn tight_latency_budgets_do_not_open_the_circuit() {
        let local = Fake::slow("local", ProviderKind::Local, Duration::from_millis(200), "eventually");
        let orchestrator = orchestrator(
            vec![(descriptor("local", ProviderKind::Local, 1), Arc::clone(&local))],
            &router(ScorerKind::AlwaysAccept, 0),
        );

        for _ in 0..3 {
            let request = InferenceRequest::from_prompt("hello").with_constraints(RequestConstraints {
                max_latency_ms: Some(10),
                ..RequestConstraints::default()
            });
            let envelope = orchestrator.handle(request).await.unwrap_err();
            assert!(matches!(envelope.attempts[0].error(), Some(ProviderError::Timeout { .. })));
        }

        let state = orchestrator.engine().monitor().snapshot("local");
        assert_eq!(state.circuit, CircuitState::Closed);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.available);

        let outcome = orchestrator
            .handle(InferenceRequest::from_prompt("no deadline this time"))
            .await
            .unwrap();
        assert_eq!(outcome.response.text, "eventually");
        assert_eq!(local.calls(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_send_one_call_to_half_open_provider() {
        let flaky = Fake::slow("flaky", ProviderKind::Local, Duration::from_millis(300), "recovered");
        let steady = Fake::replying("steady", ProviderKind::Local, "steady");
        let mut config = router(ScorerKind::AlwaysAccept, 0);
        config.capacity.cooldown = "50ms".to_owned();
        let orchestrator = Arc::new(orchestrator(
            vec![
                (descriptor("flaky", ProviderKind::Local, 9), Arc::clone(&flaky)),
                (descriptor("steady", ProviderKind::Local, 1), Arc::clone(&steady)),
            ],
            &config,
        ));
        trip(&orchestrator, "flaky");
        tokio::time::sleep(Duration::from_millis(80)).await;
        let monitor = Arc::clone(orchestrator.engine().monitor());
        assert_eq!(monitor.snapshot("flaky").circuit, CircuitState::HalfOpen);

        let mut requests = JoinSet::new();
        for i in 0..12 {
            let orchestrator = Arc::clone(&orchestrator);
            requests.spawn(async move {
                orchestrator
                    .handle(InferenceRequest::from_prompt(format!("question {i}")))
                    .await
            });
        }

        let mut recovered = 0;
        while let Some(joined) = requests.join_next().await {
            let outcome = joined.unwrap().unwrap();
            if outcome.response.provider_id == "flaky" {
                recovered += 1;
            }
        }

        assert_eq!(recovered, 1);
        assert_eq!(flaky.calls(), 1);
        assert_eq!(steady.calls(), 11);
        assert_eq!(monitor.snapshot("flaky").circuit, CircuitState::Closed);
        assert_eq!(monitor.snapshot("flaky").queue_depth, 0);
        assert_eq!(monitor.snapshot("steady").queue_depth, 0);
    }

    #[tokio::test]
    async fn accepted_response_sets_session_affinity() {
        let orchestrator = orchestrator(
            vec![
                (
                    descriptor("a", ProviderKind::Local, 1),
                    Fake::replying("a", ProviderKind::Local, "a"),
                ),
                (
                    descriptor("b", ProviderKind::Local, 1),
                    Fake::replying("b", ProviderKind::Local, "b"),
                ),
            ],
            &router(ScorerKind::AlwaysAccept, 2),
        );

        let first = orchestrator
            .handle(InferenceRequest::from_prompt("hello").with_session("s-1"))
            .await
            .unwrap();
        let chosen = first.response.provider_id.clone();
        assert_eq!(orchestrator.engine().affinity().get("session:s-1"), Some(chosen.clone()));

        let second = orchestrator
            .handle(InferenceRequest::from_prompt("and again").with_session("s-1"))
            .await
            .unwrap();
        assert_eq!(second.response.provider_id, chosen);
        assert_eq!(second.history.decisions[0].reason, DecisionReason::Affinity);
    }

    #[tokio::test]
    async fn preview_routes_without_invoking() {
        let local = Fake::replying("local", ProviderKind::Local, "unused");
        let orchestrator = orchestrator(
            vec![(descriptor("local", ProviderKind::Local, 1), Arc::clone(&local))],
            &router(ScorerKind::AlwaysAccept, 2),
        );

        let (profile, decision) = orchestrator
            .preview(&InferenceRequest::from_prompt("hello"))
            .unwrap();
        assert!(!profile.privacy_sensitive);
        assert_eq!(decision.primary_id(), "local");
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn preview_does_not_consume_quota() {
        let mut limited = descriptor("local", ProviderKind::Local, 1);
        limited.limits.requests_per_minute = Some(1);
        let orchestrator = orchestrator(
            vec![(limited, Fake::replying("local", ProviderKind::Local, "served"))],
            &router(ScorerKind::AlwaysAccept, 0),
        );

        for _ in 0..3 {
            let (_, decision) = orchestrator
                .preview(&InferenceRequest::from_prompt("hello"))
                .unwrap();
            assert_eq!(decision.primary_id(), "local");
        }

        let outcome = orchestrator
            .handle(InferenceRequest::from_prompt("hello"))
            .await
            .unwrap();
        assert_eq!(outcome.response.text, "served");

        let envelope = orchestrator
            .handle(InferenceRequest::from_prompt("hello again"))
            .await
            .unwrap_err();
        assert_eq!(envelope.kind, ErrorKind::NoEligibleProvider);
    }

    #[test]
    fn budget_allows_fallback_walk_on_errors_only() {
        let mut budget = Budget::new(&EscalationConfig {
            max_escalations: 1,
            fallback_on_error: true,
        });
        budget.fallback_len = Some(2);

        assert!(budget.spend(Escalation::Error));
        assert!(budget.spend(Escalation::Score));
        assert!(!budget.spend(Escalation::Score));
        assert!(budget.spend(Escalation::Error));
        assert!(!budget.spend(Escalation::Error));
        assert_eq!(budget.reroutes, 3);
    }
}
