//! OpenAI-compatible provider implementation
//!
//! Serves cloud APIs as well as local runtimes that expose
//! `/chat/completions` (vLLM, llama.cpp server, LM Studio).

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use switchyard_core::{InferenceRequest, InferenceResponse, ProviderDescriptor, ProviderError, ProviderKind};

use super::{Provider, check_status, endpoint, transport_error};
use crate::protocol::openai::{OpenAiErrorBody, OpenAiRequest, OpenAiResponse};

/// OpenAI-compatible provider
pub struct OpenAiCompatProvider {
    id: String,
    kind: ProviderKind,
    client: Client,
    api_key: Option<SecretString>,
}

impl OpenAiCompatProvider {
    pub fn new(descriptor: &ProviderDescriptor, client: Client, api_key: Option<SecretString>) -> Self {
        Self {
            id: descriptor.id.clone(),
            kind: descriptor.kind,
            client,
            api_key,
        }
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<OpenAiErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
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
        let wire_request = OpenAiRequest::new(request, &descriptor.model, max_tokens);

        let mut builder = self
            .client
            .post(endpoint(&descriptor.endpoint, "chat/completions"))
            .json(&wire_request);

        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| transport_error(&self.id, &e))?;
        let response = check_status(&self.id, response, error_message).await?;

        let wire_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("failed to parse response: {e}")))?;

        wire_response
            .into_response(&self.id, &descriptor.model)
            .ok_or_else(|| ProviderError::Malformed("response has no choices".to_owned()))
    }
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("authenticated", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use switchyard_core::{BackendProtocol, CapabilityLimits, CredentialRef};
    use url::Url;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn descriptor(base: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            id: "openai".to_owned(),
            kind: ProviderKind::Cloud,
            protocol: BackendProtocol::Openai,
            endpoint: Url::parse(base).unwrap(),
            model: "gpt-4o-mini".to_owned(),
            credentials: CredentialRef::Env("OPENAI_API_KEY".to_owned()),
            limits: CapabilityLimits {
                max_context_tokens: 128_000,
                max_output_tokens: Some(512),
                requests_per_minute: None,
                tokens_per_minute: None,
            },
            priority: 1,
            timeout: Duration::from_secs(5),
        }
    }

    fn provider(descriptor: &ProviderDescriptor) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            descriptor,
            Client::new(),
            Some(SecretString::from("sk-test".to_owned())),
        )
    }

    #[tokio::test]
    async fn completes_chat_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "max_tokens": 512,
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Paris."}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 9, "completion_tokens": 2}
            })))
            .mount(&server)
            .await;

        let descriptor = descriptor(&format!("{}/v1", server.uri()));
        let response = provider(&descriptor)
            .complete(&InferenceRequest::from_prompt("Capital of France?"), &descriptor)
            .await
            .unwrap();

        assert_eq!(response.text, "Paris.");
        assert_eq!(response.provider_id, "openai");
        assert_eq!(response.model, "gpt-4o-mini-2024-07-18");
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "12")
                    .set_body_json(serde_json::json!({"error": {"message": "slow down"}})),
            )
            .mount(&server)
            .await;

        let descriptor = descriptor(&format!("{}/v1", server.uri()));
        let err = provider(&descriptor)
            .complete(&InferenceRequest::from_prompt("hi"), &descriptor)
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::RateLimited { retry_after: Some(12) });
    }

    #[tokio::test]
    async fn server_error_maps_to_upstream() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(serde_json::json!({"error": {"message": "overloaded"}})),
            )
            .mount(&server)
            .await;

        let descriptor = descriptor(&format!("{}/v1", server.uri()));
        let err = provider(&descriptor)
            .complete(&InferenceRequest::from_prompt("hi"), &descriptor)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProviderError::Upstream {
                status: 503,
                message: "overloaded".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn client_error_maps_to_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let descriptor = descriptor(&format!("{}/v1", server.uri()));
        let err = provider(&descriptor)
            .complete(&InferenceRequest::from_prompt("hi"), &descriptor)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let descriptor = descriptor(&format!("{}/v1", server.uri()));
        let err = provider(&descriptor)
            .complete(&InferenceRequest::from_prompt("hi"), &descriptor)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let descriptor = descriptor("http://127.0.0.1:9/v1");
        let err = provider(&descriptor)
            .complete(&InferenceRequest::from_prompt("hi"), &descriptor)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
