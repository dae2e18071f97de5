use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub max_tokens: usize,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// Raw answer from the provider. Callers inspect the status themselves; a
/// non-success answer is surfaced to the UI verbatim, never rewrapped.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            retry,
        }
    }

    /// Sends one chat-completion request. Only HTTP 429 is retried, with the
    /// backoff schedule from [`backoff_delays`]; every other status is
    /// returned as-is on the first attempt. When retries run out the last
    /// rate-limited answer is returned unchanged.
    pub async fn chat(&self, payload: &ChatCompletionRequest) -> Result<UpstreamResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut delay = Duration::from_millis(self.retry.initial_delay_ms);
        let mut attempt = 1u32;

        loop {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(payload)
                .send()
                .await
                .context("failed to call chat completion endpoint")?;

            let status = response.status();
            let body = response
                .text()
                .await
                .context("failed to read chat completion response body")?;

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.retry.max_attempts {
                tracing::warn!(
                    "chat completion rate limited (attempt {attempt}/{}), retrying in {}ms",
                    self.retry.max_attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
                continue;
            }

            return Ok(UpstreamResponse { status, body });
        }
    }
}

/// The waits between attempts for a retry policy: one entry per retry,
/// doubling from the initial delay (600ms, 1200ms, ... by default).
pub fn backoff_delays(retry: &RetryConfig) -> Vec<Duration> {
    let mut delays = Vec::new();
    let mut delay = retry.initial_delay_ms;
    for _ in 1..retry.max_attempts {
        delays.push(Duration::from_millis(delay));
        delay *= 2;
    }
    delays
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::routing::post;
    use axum::Router;

    use super::*;

    #[derive(Clone)]
    struct StubState {
        hits: Arc<AtomicUsize>,
        replies: Arc<Vec<(StatusCode, String)>>,
    }

    async fn stub_handler(State(state): State<StubState>) -> (StatusCode, String) {
        let hit = state.hits.fetch_add(1, Ordering::SeqCst);
        let index = hit.min(state.replies.len() - 1);
        state.replies[index].clone()
    }

    async fn spawn_stub(replies: Vec<(StatusCode, &str)>) -> (SocketAddr, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = StubState {
            hits: hits.clone(),
            replies: Arc::new(
                replies
                    .into_iter()
                    .map(|(status, body)| (status, body.to_string()))
                    .collect(),
            ),
        };

        let app = Router::new()
            .route("/chat/completions", post(stub_handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub listener addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve stub");
        });

        (addr, hits)
    }

    fn test_payload() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "test-model".to_string(),
            temperature: Some(0.0),
            max_tokens: 16,
            messages: vec![ChatMessage::user("hi")],
            response_format: None,
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 5,
        }
    }

    #[test]
    fn default_backoff_doubles_from_600ms() {
        let delays = backoff_delays(&RetryConfig::default());
        assert_eq!(
            delays,
            vec![Duration::from_millis(600), Duration::from_millis(1200)]
        );
    }

    #[tokio::test]
    async fn retries_rate_limits_until_success() {
        let (addr, hits) = spawn_stub(vec![
            (StatusCode::TOO_MANY_REQUESTS, "slow down"),
            (StatusCode::TOO_MANY_REQUESTS, "slow down"),
            (StatusCode::OK, r#"{"choices":[]}"#),
        ])
        .await;

        let client = OpenAiClient::new(format!("http://{addr}"), "test-key", fast_retry());
        let started = std::time::Instant::now();
        let response = client.chat(&test_payload()).await.expect("chat call");

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        // Two waits with doubling: 5ms then 10ms.
        assert!(started.elapsed() >= Duration::from_millis(15));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, r#"{"choices":[]}"#);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_rate_limit_verbatim() {
        let (addr, hits) = spawn_stub(vec![
            (StatusCode::TOO_MANY_REQUESTS, "first"),
            (StatusCode::TOO_MANY_REQUESTS, "second"),
            (StatusCode::TOO_MANY_REQUESTS, "third"),
        ])
        .await;

        let client = OpenAiClient::new(format!("http://{addr}"), "test-key", fast_retry());
        let response = client.chat(&test_payload()).await.expect("chat call");

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.body, "third");
    }

    #[tokio::test]
    async fn non_rate_limit_errors_are_not_retried() {
        let (addr, hits) = spawn_stub(vec![
            (StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            (StatusCode::OK, "never reached"),
        ])
        .await;

        let client = OpenAiClient::new(format!("http://{addr}"), "test-key", fast_retry());
        let response = client.chat(&test_payload()).await.expect("chat call");

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body, "boom");
    }

    #[tokio::test]
    async fn temperature_is_omitted_when_unset() {
        let payload = ChatCompletionRequest {
            temperature: None,
            ..test_payload()
        };
        let encoded = serde_json::to_string(&payload).expect("encode payload");
        assert!(!encoded.contains("temperature"));
        assert!(encoded.contains(r#""role":"user"#));
    }
}
