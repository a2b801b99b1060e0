//! `OpenAI` chat completion API wire format types

use serde::{Deserialize, Serialize};
use switchyard_core::{FinishReason, InferenceRequest, InferenceResponse, Role, Usage};

// -- Request types --

/// `OpenAI` chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<OpenAiMessage>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Always false; streaming is not used
    pub stream: bool,
}

/// `OpenAI` message within a request or response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    /// Message role
    pub role: String,
    /// Text content, absent for tool-only replies
    #[serde(default)]
    pub content: Option<String>,
}

impl OpenAiRequest {
    pub fn new(request: &InferenceRequest, model: &str, max_tokens: Option<u32>) -> Self {
        Self {
            model: model.to_owned(),
            messages: request
                .messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: role_name(m.role).to_owned(),
                    content: Some(m.content.clone()),
                })
                .collect(),
            temperature: request.temperature,
            max_tokens,
            stream: false,
        }
    }
}

pub(crate) const fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

// -- Response types --

/// `OpenAI` chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiResponse {
    /// Model that produced the response
    #[serde(default)]
    pub model: String,
    /// Completion choices
    pub choices: Vec<OpenAiChoice>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
    /// Self-reported confidence, sent by some self-hosted gateways
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// One completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoice {
    /// Choice index
    #[serde(default)]
    pub index: u32,
    /// Generated message
    pub message: OpenAiMessage,
    /// Why generation stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// `OpenAI` token usage
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl OpenAiResponse {
    /// Convert the first choice into a normalized response
    pub fn into_response(self, provider_id: &str, fallback_model: &str) -> Option<InferenceResponse> {
        let choice = self.choices.into_iter().next()?;
        let model = if self.model.is_empty() {
            fallback_model.to_owned()
        } else {
            self.model
        };

        Some(InferenceResponse {
            provider_id: provider_id.to_owned(),
            model,
            text: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_wire),
            usage: self.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            confidence: self.confidence,
        })
    }
}

/// `OpenAI` error envelope
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiErrorBody {
    pub error: OpenAiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiErrorDetail {
    pub message: String,
}
