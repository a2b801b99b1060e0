//! Immutable provider catalog with atomic replacement
//!
//! A snapshot bundles descriptors, quota limiters and adapters. Reloading
//! builds a complete new snapshot and swaps it in; requests that already
//! loaded the old one keep using it until they finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use reqwest::Client;
use switchyard_config::ProviderConfig;
use switchyard_core::{BackendProtocol, ProviderDescriptor};
use switchyard_routing::{CapacityMonitor, ProviderPool};
use thiserror::Error;

use crate::adapter::ProviderAdapter;
use crate::provider::Provider;
use crate::provider::ollama::OllamaProvider;
use crate::provider::openai::OpenAiCompatProvider;
use crate::secrets::{SecretError, SecretResolver};

/// Errors building a catalog snapshot
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A provider entry could not be turned into a descriptor
    #[error("invalid provider '{id}': {message}")]
    InvalidProvider { id: String, message: String },

    /// A credential reference could not be resolved
    #[error("provider '{id}': {source}")]
    Credentials {
        id: String,
        #[source]
        source: SecretError,
    },

    /// Two entries share an id
    #[error("duplicate provider id '{0}'")]
    DuplicateId(String),

    /// The HTTP client could not be created
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// One consistent view of the configured providers
#[derive(Debug)]
pub struct CatalogSnapshot {
    version: u64,
    pool: ProviderPool,
    adapters: HashMap<String, ProviderAdapter>,
}

impl CatalogSnapshot {
    /// Assemble a snapshot from descriptors and their providers
    pub fn from_parts(
        version: u64,
        entries: Vec<(ProviderDescriptor, Arc<dyn Provider>)>,
        monitor: &Arc<CapacityMonitor>,
    ) -> Result<Self, CatalogError> {
        let mut adapters = HashMap::with_capacity(entries.len());
        let mut descriptors = Vec::with_capacity(entries.len());

        for (descriptor, provider) in entries {
            if adapters.contains_key(&descriptor.id) {
                return Err(CatalogError::DuplicateId(descriptor.id));
            }
            adapters.insert(
                descriptor.id.clone(),
                ProviderAdapter::new(provider, Arc::clone(monitor)),
            );
            descriptors.push(Arc::new(descriptor));
        }

        Ok(Self {
            version,
            pool: ProviderPool::new(descriptors),
            adapters,
        })
    }

    pub const fn version(&self) -> u64 {
        self.version
    }

    pub const fn pool(&self) -> &ProviderPool {
        &self.pool
    }

    pub fn adapter(&self, provider_id: &str) -> Option<&ProviderAdapter> {
        self.adapters.get(provider_id)
    }

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.pool.descriptors().iter().map(|d| d.id.as_str())
    }
}

/// Shared, hot-swappable provider catalog
pub struct ProviderCatalog {
    current: ArcSwap<CatalogSnapshot>,
    monitor: Arc<CapacityMonitor>,
    resolver: Arc<dyn SecretResolver>,
    client: Client,
    next_version: AtomicU64,
}

impl ProviderCatalog {
    /// Build the initial snapshot from provider configuration
    pub fn from_config(
        providers: &[ProviderConfig],
        monitor: Arc<CapacityMonitor>,
        resolver: Arc<dyn SecretResolver>,
    ) -> Result<Self, CatalogError> {
        let client = Client::builder().build()?;
        let snapshot = build_snapshot(1, providers, &monitor, resolver.as_ref(), &client)?;
        log_snapshot(&snapshot);

        Ok(Self {
            current: ArcSwap::from_pointee(snapshot),
            monitor,
            resolver,
            client,
            next_version: AtomicU64::new(2),
        })
    }

    /// Wrap a prebuilt snapshot
    pub fn from_snapshot(
        snapshot: CatalogSnapshot,
        monitor: Arc<CapacityMonitor>,
        resolver: Arc<dyn SecretResolver>,
    ) -> Self {
        let next = snapshot.version() + 1;
        Self {
            current: ArcSwap::from_pointee(snapshot),
            monitor,
            resolver,
            client: Client::new(),
            next_version: AtomicU64::new(next),
        }
    }

    /// Current snapshot; holding it pins that version
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.load_full()
    }

    pub const fn monitor(&self) -> &Arc<CapacityMonitor> {
        &self.monitor
    }

    /// Replace the whole provider set
    ///
    /// On error the current snapshot stays in place.
    pub fn reload(&self, providers: &[ProviderConfig]) -> Result<u64, CatalogError> {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let snapshot = build_snapshot(version, providers, &self.monitor, self.resolver.as_ref(), &self.client)?;
        self.install(snapshot);
        Ok(version)
    }

    /// Swap in a prebuilt snapshot
    ///
    /// Quota limiters of providers whose limits are unchanged are shared
    /// with the outgoing snapshot.
    pub fn install(&self, mut snapshot: CatalogSnapshot) {
        snapshot.pool.inherit_quotas(self.current.load().pool());
        let ids: Vec<String> = snapshot.provider_ids().map(str::to_owned).collect();
        self.monitor.retain_providers(ids.iter().map(String::as_str));
        log_snapshot(&snapshot);
        self.current.store(Arc::new(snapshot));
    }
}

impl std::fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCatalog")
            .field("version", &self.current.load().version())
            .finish_non_exhaustive()
    }
}

fn build_snapshot(
    version: u64,
    providers: &[ProviderConfig],
    monitor: &Arc<CapacityMonitor>,
    resolver: &dyn SecretResolver,
    client: &Client,
) -> Result<CatalogSnapshot, CatalogError> {
    let mut entries: Vec<(ProviderDescriptor, Arc<dyn Provider>)> = Vec::with_capacity(providers.len());

    for config in providers {
        let descriptor = ProviderDescriptor::from_config(config).map_err(|e| CatalogError::InvalidProvider {
            id: config.id.clone(),
            message: e.to_string(),
        })?;

        let secret = resolver
            .resolve(&descriptor.credentials)
            .map_err(|source| CatalogError::Credentials {
                id: config.id.clone(),
                source,
            })?;

        let provider: Arc<dyn Provider> = match descriptor.protocol {
            BackendProtocol::Openai => Arc::new(OpenAiCompatProvider::new(&descriptor, client.clone(), secret)),
            BackendProtocol::Ollama => Arc::new(OllamaProvider::new(&descriptor, client.clone())),
        };
        entries.push((descriptor, provider));
    }

    CatalogSnapshot::from_parts(version, entries, monitor)
}

fn log_snapshot(snapshot: &CatalogSnapshot) {
    let local = snapshot.pool().descriptors().iter().filter(|d| d.is_local()).count();
    tracing::info!(
        version = snapshot.version(),
        providers = snapshot.pool().len(),
        local,
        cloud = snapshot.pool().len() - local,
        "provider catalog installed"
    );
}
