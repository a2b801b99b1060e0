use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration for a single inference provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Unique provider identifier
    pub id: String,
    /// Where the provider runs
    pub kind: ProviderKind,
    /// Wire protocol spoken by the backend
    #[serde(default)]
    pub protocol: BackendProtocol,
    /// Base URL of the backend API
    pub endpoint: Url,
    /// Model served by this provider
    pub model: String,
    /// Reference to the credential, resolved at startup (e.g. `env:OPENAI_API_KEY`)
    #[serde(default)]
    pub credentials: Option<String>,
    /// Static priority, higher is preferred
    #[serde(default)]
    pub priority: u32,
    /// Per-attempt timeout (e.g. "30s")
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Capability limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Capability and quota limits for a provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Context window in tokens
    #[serde(default = "default_max_context")]
    pub max_context_tokens: u32,
    /// Maximum tokens the provider will generate per request
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    /// Requests per minute quota
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    /// Tokens per minute quota
    #[serde(default)]
    pub tokens_per_minute: Option<u32>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context(),
            max_output_tokens: None,
            requests_per_minute: None,
            tokens_per_minute: None,
        }
    }
}

/// Where a provider runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// On-premise GPU runtime; private data may go here
    Local,
    /// Third-party hosted API
    Cloud,
}

impl ProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Backend wire protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendProtocol {
    /// `OpenAI`-compatible chat completions (cloud APIs, vLLM, llama.cpp server)
    #[default]
    Openai,
    /// Ollama native chat API
    Ollama,
}

impl BackendProtocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for BackendProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Indirect reference to a credential held by an external secrets store
///
/// Literal keys are never accepted in provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CredentialRef {
    /// No credential required
    #[default]
    None,
    /// Read from an environment variable
    Env(String),
    /// Read from a file (e.g. a mounted secret)
    File(PathBuf),
}

impl FromStr for CredentialRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "none" {
            return Ok(Self::None);
        }

        match s.split_once(':') {
            Some(("env", name)) if !name.is_empty() => Ok(Self::Env(name.to_owned())),
            Some(("file", path)) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
            _ => Err(format!(
                "credential reference must be `env:NAME`, `file:/path` or `none`, got `{}`",
                redact(s)
            )),
        }
    }
}

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Env(name) => write!(f, "env:{name}"),
            Self::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

/// Short prefix of a rejected reference, safe to print
fn redact(s: &str) -> String {
    let prefix: String = s.chars().take(4).collect();
    format!("{prefix}…")
}

fn default_timeout() -> String {
    "30s".to_owned()
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_context() -> u32 {
    8192
}
