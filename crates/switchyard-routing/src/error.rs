//! Routing-specific error types

use switchyard_core::Exclusion;
use thiserror::Error;

/// Errors that can occur while selecting a provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Every candidate was filtered out
    #[error("no eligible provider ({} excluded)", excluded.len())]
    NoEligibleProvider {
        /// Each filtered provider with the reason it was dropped
        excluded: Vec<(String, Exclusion)>,
    },
}

impl RoutingError {
    /// Exclusions behind the failure
    pub fn excluded(&self) -> &[(String, Exclusion)] {
        match self {
            Self::NoEligibleProvider { excluded } => excluded,
        }
    }
}
