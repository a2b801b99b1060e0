//! Provider routing for Switchyard
//!
//! - **Classifier**: token and pattern heuristics into a `ComplexityProfile`
//! - **Capacity**: rolling provider metrics and a per-provider circuit breaker
//! - **Engine**: privacy, availability and capability filtering, ranking, quota admission
//! - **Quality**: pluggable response scoring against a threshold

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod affinity;
pub mod capacity;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod quality;
pub mod quota;
pub mod ranking;

pub use affinity::AffinityMap;
pub use capacity::{CallOutcome, CapacityMonitor, CapacitySettings, InFlight};
pub use classifier::{classify, estimate_tokens};
pub use engine::{ProviderPool, RoutingEngine};
pub use error::RoutingError;
pub use quality::{QualityGate, QualityScorer, scorer_for};
pub use quota::{ProviderQuota, QuotaBook};
pub use ranking::{PolicyRegistry, RankingPolicy};
