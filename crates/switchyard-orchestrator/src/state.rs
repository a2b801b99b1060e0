//! Per-request state machine and its transition trail

use serde::Serialize;
use uuid::Uuid;

/// Lifecycle state of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Validating,
    Classifying,
    Routing,
    Invoking,
    Evaluating,
    Escalating,
    Completed,
    Failed,
}

impl RequestState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Classifying => "classifying",
            Self::Routing => "routing",
            Self::Invoking => "invoking",
            Self::Evaluating => "evaluating",
            Self::Escalating => "escalating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `next` may directly follow this state
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Validating, Self::Classifying | Self::Failed)
                | (Self::Classifying, Self::Routing)
                | (Self::Routing, Self::Invoking | Self::Failed)
                | (Self::Invoking, Self::Evaluating)
                | (Self::Evaluating, Self::Completed | Self::Escalating | Self::Failed)
                | (Self::Escalating, Self::Routing)
        )
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered record of visited states; emits one event per transition
#[derive(Debug)]
pub(crate) struct StateTrail {
    request_id: Uuid,
    states: Vec<RequestState>,
}

impl StateTrail {
    pub(crate) fn start(request_id: Uuid) -> Self {
        let mut trail = Self {
            request_id,
            states: Vec::with_capacity(8),
        };
        trail.enter(RequestState::Validating);
        trail
    }

    pub(crate) fn enter(&mut self, next: RequestState) {
        let from = self.states.last().copied();
        debug_assert!(
            from.is_none_or(|f| f.can_transition_to(next)),
            "illegal transition {from:?} -> {next:?}"
        );

        tracing::info!(
            target: "switchyard::transition",
            request_id = %self.request_id,
            from = from.map(RequestState::as_str),
            to = next.as_str(),
            step = self.states.len(),
            "request state changed"
        );
        self.states.push(next);
    }

    pub(crate) fn into_states(self) -> Vec<RequestState> {
        self.states
    }
}
