//! Ollama native `/api/chat` wire format types

use serde::{Deserialize, Serialize};
use switchyard_core::{FinishReason, InferenceRequest, InferenceResponse, Usage};

use super::openai::role_name;

/// Ollama chat request
#[derive(Debug, Clone, Serialize)]
pub struct OllamaRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    /// Always false; streaming is not used
    pub stream: bool,
    #[serde(skip_serializing_if = "OllamaOptions::is_empty")]
    pub options: OllamaOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Sampling options
#[derive(Debug, Clone, Default, Serialize)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

impl OllamaOptions {
    const fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none()
    }
}

impl OllamaRequest {
    pub fn new(request: &InferenceRequest, model: &str, max_tokens: Option<u32>) -> Self {
        Self {
            model: model.to_owned(),
            messages: request
                .messages
                .iter()
                .map(|m| OllamaMessage {
                    role: role_name(m.role).to_owned(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: max_tokens,
            },
        }
    }
}

/// Ollama chat response
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaResponse {
    #[serde(default)]
    pub model: String,
    pub message: OllamaMessage,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
}

impl OllamaResponse {
    pub fn into_response(self, provider_id: &str, fallback_model: &str) -> InferenceResponse {
        let usage = (self.prompt_eval_count.is_some() || self.eval_count.is_some()).then(|| Usage {
            prompt_tokens: self.prompt_eval_count.unwrap_or(0),
            completion_tokens: self.eval_count.unwrap_or(0),
        });

        InferenceResponse {
            provider_id: provider_id.to_owned(),
            model: if self.model.is_empty() {
                fallback_model.to_owned()
            } else {
                self.model
            },
            text: self.message.content,
            finish_reason: self.done_reason.as_deref().map(FinishReason::from_wire),
            usage,
            confidence: None,
        }
    }
}

/// Ollama error body
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_are_omitted_when_unset() {
        let request = InferenceRequest::from_prompt("hi");
        let wire = serde_json::to_value(OllamaRequest::new(&request, "llama3.2", None)).unwrap();
        assert!(wire.get("options").is_none());
        assert_eq!(wire["stream"], false);
        assert_eq!(wire["messages"][0]["role"], "user");
    }

    #[test]
    fn eval_counts_map_to_usage() {
        let wire: OllamaResponse = serde_json::from_value(serde_json::json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "hi there"},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 12,
            "eval_count": 3
        }))
        .unwrap();
        let response = wire.into_response("ollama", "m");
        assert_eq!(response.usage.unwrap().total(), 15);
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    }
}
