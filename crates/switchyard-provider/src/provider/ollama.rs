//! Ollama native API provider implementation

use async_trait::async_trait;
use reqwest::Client;
use switchyard_core::{InferenceRequest, InferenceResponse, ProviderDescriptor, ProviderError, ProviderKind};

use super::{Provider, check_status, endpoint, transport_error};
use crate::protocol::ollama::{OllamaErrorBody, OllamaRequest, OllamaResponse};

/// Ollama `/api/chat` provider
#[derive(Debug)]
pub struct OllamaProvider {
    id: String,
    kind: ProviderKind,
    client: Client,
}

impl OllamaProvider {
    pub fn new(descriptor: &ProviderDescriptor, client: Client) -> Self {
        Self {
            id: descriptor.id.clone(),
            kind: descriptor.kind,
            client,
        }
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<OllamaErrorBody>(body).ok().map(|b| b.error)
}

#[async_trait]
impl Provider for OllamaProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(
        &self,
        request: &InferenceRequest,
        descriptor: &ProviderDescriptor,
    ) -> Result<InferenceResponse, ProviderError> {
        let max_tokens = request
            .constraints
            .max_output_tokens
            .or(descriptor.limits.max_output_tokens);
        let wire_request = OllamaRequest::new(request, &descriptor.model, max_tokens);

        let response = self
            .client
            .post(endpoint(&descriptor.endpoint, "api/chat"))
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| transport_error(&self.id, &e))?;
        let response = check_status(&self.id, response, error_message).await?;

        let wire_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("failed to parse response: {e}")))?;

        Ok(wire_response.into_response(&self.id, &descriptor.model))
    }
}
