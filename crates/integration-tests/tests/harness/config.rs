//! Programmatic configuration builder for integration tests

use switchyard_config::{BackendProtocol, Config, LimitsConfig, ProviderConfig, ProviderKind, ScorerKind};
use url::Url;

/// Builder for test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// No providers, accept-all scorer, defaults elsewhere
    pub fn new() -> Self {
        let mut config = Config::default();
        config.router.quality.scorer = ScorerKind::AlwaysAccept;
        Self { config }
    }

    pub fn with_local(self, id: &str, base_url: &str, priority: u32) -> Self {
        self.with_provider(id, ProviderKind::Local, base_url, priority)
    }

    pub fn with_cloud(self, id: &str, base_url: &str, priority: u32) -> Self {
        self.with_provider(id, ProviderKind::Cloud, base_url, priority)
    }

    fn with_provider(mut self, id: &str, kind: ProviderKind, base_url: &str, priority: u32) -> Self {
        self.config.providers.push(ProviderConfig {
            id: id.to_owned(),
            kind,
            protocol: BackendProtocol::Openai,
            endpoint: Url::parse(base_url).expect("valid mock url"),
            model: "mock-model-1".to_owned(),
            credentials: None,
            priority,
            timeout: "5s".to_owned(),
            limits: LimitsConfig::default(),
        });
        self
    }

    /// Per-attempt timeout of the most recently added provider
    pub fn timeout(mut self, timeout: &str) -> Self {
        if let Some(provider) = self.config.providers.last_mut() {
            timeout.clone_into(&mut provider.timeout);
        }
        self
    }

    pub fn scorer(mut self, scorer: ScorerKind, threshold: f64) -> Self {
        self.config.router.quality.scorer = scorer;
        self.config.router.quality.threshold = threshold;
        self
    }

    pub fn max_escalations(mut self, cap: u32) -> Self {
        self.config.router.escalation.max_escalations = cap;
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.router.capacity.failure_threshold = threshold;
        self
    }

    pub fn build(self) -> Config {
        self.config.validate().expect("test config is valid");
        self.config
    }
}
