use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant turn from earlier in the conversation
    Assistant,
}

/// One message of the prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author role
    pub role: Role,
    /// Text content
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Caller-declared constraints on how the request may be served
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConstraints {
    /// End-to-end latency budget in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    /// Data must not leave local providers
    #[serde(default)]
    pub privacy_sensitive: bool,
    /// Context size the caller will need, overriding the estimate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_tokens: Option<u32>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl RequestConstraints {
    pub fn max_latency(&self) -> Option<Duration> {
        self.max_latency_ms.map(Duration::from_millis)
    }
}

/// Immutable inference request as received at ingress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Request identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Prompt messages
    pub messages: Vec<Message>,
    /// Declared constraints
    #[serde(default)]
    pub constraints: RequestConstraints,
    /// Caller-supplied domain tags (e.g. "code", "legal")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain_tags: Vec<String>,
    /// Caller identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Session reference used for provider affinity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Sampling temperature passed through to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Output length the caller expects, used by quality heuristics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output_tokens: Option<u32>,
}

impl InferenceRequest {
    /// Create a request with a fresh id and default constraints
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            messages,
            constraints: RequestConstraints::default(),
            domain_tags: Vec::new(),
            identity: None,
            session_id: None,
            temperature: None,
            expected_output_tokens: None,
        }
    }

    /// Create a single-turn request from a user prompt
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self::new(vec![Message::user(prompt)])
    }

    #[must_use]
    pub const fn with_privacy(mut self, privacy_sensitive: bool) -> Self {
        self.constraints.privacy_sensitive = privacy_sensitive;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_domain_tag(mut self, tag: impl Into<String>) -> Self {
        self.domain_tags.push(tag.into());
        self
    }

    #[must_use]
    pub const fn with_constraints(mut self, constraints: RequestConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// All message text joined by newlines
    pub fn full_text(&self) -> String {
        let mut text = String::new();
        for message in &self.messages {
            text.push_str(&message.content);
            text.push('\n');
        }
        text
    }

    /// Content of the last user message, or empty
    pub fn last_user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map_or("", |m| m.content.as_str())
    }

    /// The system prompt, if any
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Whether any message carries non-whitespace text
    pub fn has_content(&self) -> bool {
        self.messages.iter().any(|m| !m.content.trim().is_empty())
    }
}
