use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::{CapacityConfig, Config, CredentialRef, ProviderConfig, RankingConfig};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails,
    /// or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let config = Self::from_toml(&raw)?;

        tracing::debug!(
            path = %path.display(),
            providers = config.providers.len(),
            "configuration loaded"
        );

        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if TOML parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_providers()?;
        self.validate_router()?;
        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                anyhow::bail!("provider id must not be empty");
            }
            if !seen.insert(provider.id.as_str()) {
                anyhow::bail!("duplicate provider id '{}'", provider.id);
            }
            validate_provider(provider)?;
        }

        Ok(())
    }

    fn validate_router(&self) -> anyhow::Result<()> {
        validate_ranking(&self.router.ranking)?;
        validate_capacity(&self.router.capacity)?;

        let threshold = self.router.quality.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("router.quality.threshold must be between 0.0 and 1.0, got {threshold}");
        }

        if let Some(ref telemetry) = self.telemetry
            && !(0.0..=1.0).contains(&telemetry.sampling_rate)
        {
            anyhow::bail!(
                "telemetry.sampling_rate must be between 0.0 and 1.0, got {}",
                telemetry.sampling_rate
            );
        }

        Ok(())
    }
}

fn validate_provider(provider: &ProviderConfig) -> anyhow::Result<()> {
    let id = &provider.id;

    if provider.model.trim().is_empty() {
        anyhow::bail!("provider '{id}' must name a model");
    }

    if let Some(ref reference) = provider.credentials {
        reference
            .parse::<CredentialRef>()
            .map_err(|e| anyhow::anyhow!("provider '{id}': {e}"))?;
    }

    let timeout = parse_duration(&provider.timeout).map_err(|e| anyhow::anyhow!("provider '{id}' timeout: {e}"))?;
    if timeout.is_zero() {
        anyhow::bail!("provider '{id}' timeout must be greater than 0");
    }

    let limits = &provider.limits;
    if limits.max_context_tokens == 0 {
        anyhow::bail!("provider '{id}' limits.max_context_tokens must be greater than 0");
    }
    if limits.requests_per_minute == Some(0) || limits.tokens_per_minute == Some(0) {
        anyhow::bail!("provider '{id}' quotas must be greater than 0 when set");
    }

    Ok(())
}

fn validate_ranking(ranking: &RankingConfig) -> anyhow::Result<()> {
    let weights = [
        ("weight_affinity", ranking.weight_affinity),
        ("weight_load", ranking.weight_load),
        ("weight_priority", ranking.weight_priority),
        ("weight_complexity", ranking.weight_complexity),
    ];
    for (name, weight) in weights {
        if !weight.is_finite() || weight < 0.0 {
            anyhow::bail!("router.ranking.{name} must be a non-negative number, got {weight}");
        }
    }

    if ranking.queue_ceiling == 0 {
        anyhow::bail!("router.ranking.queue_ceiling must be greater than 0");
    }
    if ranking.latency_ceiling_ms <= 0.0 {
        anyhow::bail!("router.ranking.latency_ceiling_ms must be greater than 0");
    }

    Ok(())
}

fn validate_capacity(capacity: &CapacityConfig) -> anyhow::Result<()> {
    parse_duration(&capacity.window).map_err(|e| anyhow::anyhow!("router.capacity.window: {e}"))?;
    parse_duration(&capacity.cooldown).map_err(|e| anyhow::anyhow!("router.capacity.cooldown: {e}"))?;

    if capacity.failure_threshold == 0 {
        anyhow::bail!("router.capacity.failure_threshold must be greater than 0");
    }
    if capacity.max_samples == 0 {
        anyhow::bail!("router.capacity.max_samples must be greater than 0");
    }

    Ok(())
}

/// Parse a human duration such as "30s" or "1m"
///
/// # Errors
///
/// Returns an error if the string is not a valid duration
pub fn parse_duration(value: &str) -> anyhow::Result<Duration> {
    duration_str::parse(value).map_err(|e| anyhow::anyhow!("invalid duration '{value}': {e}"))
}
