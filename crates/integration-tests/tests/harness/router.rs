//! Builds an orchestrator the way the binary does

use std::sync::Arc;

use switchyard_config::Config;
use switchyard_orchestrator::Orchestrator;
use switchyard_provider::{ProviderCatalog, SystemSecretResolver};
use switchyard_routing::{CapacityMonitor, CapacitySettings};

pub fn orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let monitor = Arc::new(CapacityMonitor::new(CapacitySettings::from_config(
        &config.router.capacity,
    )?));
    let catalog = ProviderCatalog::from_config(&config.providers, monitor, Arc::new(SystemSecretResolver))?;
    Ok(Orchestrator::from_config(&config.router, Arc::new(catalog)))
}
