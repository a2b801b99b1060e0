use serde::{Deserialize, Serialize};

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the output token limit
    Length,
    /// Content was filtered by the provider
    ContentFilter,
    /// Anything else the backend reported
    Other,
}

impl FinishReason {
    /// Map a provider-native finish reason string
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" | "eos" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            "content_filter" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
}

impl Usage {
    pub const fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Normalized response from any provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    /// Provider that produced the response
    pub provider_id: String,
    /// Model reported by the backend
    pub model: String,
    /// Generated text
    pub text: String,
    /// Why generation stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Token usage, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Provider-reported confidence (0.0 to 1.0), if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl InferenceResponse {
    /// Build a plain text response with no metadata
    pub fn text(provider_id: impl Into<String>, model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model: model.into(),
            text: text.into(),
            finish_reason: Some(FinishReason::Stop),
            usage: None,
            confidence: None,
        }
    }

    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    #[must_use]
    pub const fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }
}
