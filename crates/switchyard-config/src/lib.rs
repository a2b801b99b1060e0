#![allow(clippy::must_use_candidate)]

mod loader;
pub mod provider;
pub mod router;
pub mod telemetry;

use serde::Deserialize;

pub use loader::parse_duration;
pub use provider::*;
pub use router::*;
pub use telemetry::TelemetryConfig;

/// Top-level Switchyard configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Routing policy
    #[serde(default)]
    pub router: RouterConfig,
    /// Provider descriptors, in declaration order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
