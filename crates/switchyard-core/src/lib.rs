//! Shared data model for Switchyard
//!
//! Requests, provider descriptors, live provider state, routing decisions
//! and attempt records passed between the classifier, router, adapters and
//! orchestrator.

#![allow(clippy::must_use_candidate)]

pub mod attempt;
pub mod descriptor;
pub mod error;
pub mod request;
pub mod response;
pub mod routing;
pub mod state;

pub use attempt::{InferenceAttempt, QualityVerdict, RequestHistory, Verdict};
pub use descriptor::{CapabilityLimits, ProviderDescriptor};
pub use error::{ErrorKind, ProviderError};
pub use request::{InferenceRequest, Message, RequestConstraints, Role};
pub use response::{FinishReason, InferenceResponse, Usage};
pub use routing::{ComplexityProfile, ComplexitySignal, Confidence, DecisionReason, Exclusion, RoutingDecision, TaskClass};
pub use state::{CircuitState, ProviderState};
pub use switchyard_config::{BackendProtocol, CredentialRef, ProviderKind};
