//! Errors surfaced to callers of the orchestrator

use switchyard_core::{ErrorKind, InferenceAttempt, InferenceResponse, ProviderError, RoutingDecision};
use switchyard_routing::RoutingError;
use thiserror::Error;
use uuid::Uuid;

use crate::state::RequestState;

/// Why a request ended in `Failed`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    /// Rejected before classification
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Routing found no usable provider
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Every attempt failed and none produced a response
    #[error("all provider attempts failed, last error: {0}")]
    Provider(ProviderError),

    /// Budget exhausted with responses that never passed the quality gate
    #[error("no response reached the quality threshold after {attempts} attempts (best score {best_score:.2})")]
    QualityUnattainable { attempts: usize, best_score: f64 },
}

impl OrchestratorError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Routing(RoutingError::NoEligibleProvider { .. }) => ErrorKind::NoEligibleProvider,
            Self::Provider(_) => ErrorKind::ProviderError,
            Self::QualityUnattainable { .. } => ErrorKind::QualityUnattainable,
        }
    }
}

/// What the caller receives when a request fails
///
/// `best_response` is the highest scoring response seen, so a caller may
/// accept a degraded answer after `QualityUnattainable`.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
    pub request_id: Uuid,
    pub attempts: Vec<InferenceAttempt>,
    pub best_response: Option<InferenceResponse>,
    pub decisions: Vec<RoutingDecision>,
    pub states: Vec<RequestState>,
    pub error: OrchestratorError,
}
