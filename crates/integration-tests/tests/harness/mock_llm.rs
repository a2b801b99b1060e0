//! Mock OpenAI-compatible backend for integration tests
//!
//! Serves `/v1/chat/completions` with a canned reply, optionally failing
//! the first requests or answering slowly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// How the mock answers
#[derive(Debug, Clone)]
pub struct Behaviour {
    pub content: String,
    /// Reported in the response body when set
    pub confidence: Option<f64>,
    /// Requests to fail before answering (`u32::MAX` fails forever)
    pub fail_first: u32,
    /// Status used for failed requests
    pub fail_status: StatusCode,
    /// Delay before every answer
    pub delay: Duration,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            content: "Hello from mock LLM".to_owned(),
            confidence: None,
            fail_first: 0,
            fail_status: StatusCode::INTERNAL_SERVER_ERROR,
            delay: Duration::ZERO,
        }
    }
}

/// Mock backend bound to an ephemeral port
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    behaviour: Behaviour,
    request_count: AtomicU32,
    completion_count: AtomicU32,
}

impl MockLlm {
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(Behaviour::default()).await
    }

    pub async fn start_with_response(content: &str) -> anyhow::Result<Self> {
        Self::start_with(Behaviour {
            content: content.to_owned(),
            ..Behaviour::default()
        })
        .await
    }

    /// Fail the first `n` requests with 500
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::start_with(Behaviour {
            fail_first: n,
            ..Behaviour::default()
        })
        .await
    }

    pub async fn start_with(behaviour: Behaviour) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            behaviour,
            request_count: AtomicU32::new(0),
            completion_count: AtomicU32::new(0),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL including `/v1`; the adapter appends `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Requests received, failed ones included
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Requests answered successfully
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[allow(dead_code)]
    role: String,
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionResponse {
    id: String,
    object: String,
    created: u64,
    model: String,
    choices: Vec<Choice>,
    usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Choice {
    index: u32,
    message: ResponseMessage,
    finish_reason: String,
}

#[derive(Debug, Serialize)]
struct ResponseMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

async fn handle_chat_completions(
    State(state): State<Arc<MockLlmState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    let seen = state.request_count.fetch_add(1, Ordering::Relaxed);
    let behaviour = &state.behaviour;

    if !behaviour.delay.is_zero() {
        tokio::time::sleep(behaviour.delay).await;
    }

    if seen < behaviour.fail_first {
        let body = serde_json::json!({
            "error": { "message": "mock backend failure", "type": "server_error" }
        });
        return (behaviour.fail_status, Json(body)).into_response();
    }

    state.completion_count.fetch_add(1, Ordering::Relaxed);

    let prompt_tokens = request
        .messages
        .iter()
        .filter_map(|m| m.content.as_deref())
        .map(|c| u32::try_from(c.split_whitespace().count()).unwrap_or(u32::MAX))
        .sum::<u32>();
    let completion_tokens = u32::try_from(behaviour.content.split_whitespace().count()).unwrap_or(u32::MAX);

    Json(ChatCompletionResponse {
        id: format!("chatcmpl-mock-{seen}"),
        object: "chat.completion".to_owned(),
        created: 1_700_000_000,
        model: request.model,
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_owned(),
                content: behaviour.content.clone(),
            },
            finish_reason: "stop".to_owned(),
        }],
        usage: Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        },
        confidence: behaviour.confidence,
    })
    .into_response()
}
