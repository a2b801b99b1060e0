//! Provider trait and implementations for inference backends

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use reqwest::{Response, StatusCode, header::RETRY_AFTER};
use switchyard_core::{InferenceRequest, InferenceResponse, ProviderDescriptor, ProviderError, ProviderKind};

/// Longest upstream error body kept in a `ProviderError`
const MAX_ERROR_BODY: usize = 512;

/// Trait implemented by each inference backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier from configuration
    fn id(&self) -> &str;

    /// Local or cloud
    fn kind(&self) -> ProviderKind;

    /// Send a non-streaming completion request
    async fn complete(
        &self,
        request: &InferenceRequest,
        descriptor: &ProviderDescriptor,
    ) -> Result<InferenceResponse, ProviderError>;
}

/// Map a transport failure
pub(crate) fn transport_error(provider: &str, error: &reqwest::Error) -> ProviderError {
    tracing::error!(provider, error = %error, "upstream request failed");
    if error.is_decode() {
        ProviderError::Malformed(error.to_string())
    } else {
        ProviderError::Unavailable(error.to_string())
    }
}

/// Pass through a successful response, map everything else
pub(crate) async fn check_status(
    provider: &str,
    response: Response,
    extract_message: fn(&str) -> Option<String>,
) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    let message = extract_message(&body).unwrap_or_else(|| truncate(&body));

    tracing::warn!(provider, status = %status, "upstream returned error");

    Err(status_error(status, retry_after, message))
}

fn status_error(status: StatusCode, retry_after: Option<u64>, message: String) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited { retry_after }
    } else if status.is_server_error() {
        ProviderError::Upstream {
            status: status.as_u16(),
            message,
        }
    } else {
        ProviderError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= MAX_ERROR_BODY {
        return trimmed.to_owned();
    }
    let mut end = MAX_ERROR_BODY;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

/// Join a path onto a base URL that may or may not end with '/'
pub(crate) fn endpoint(base: &url::Url, path: &str) -> String {
    let base = base.as_str().trim_end_matches('/');
    format!("{base}/{path}")
}
