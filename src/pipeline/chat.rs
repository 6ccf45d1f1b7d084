//! Remote invocation: one blocking chat round trip to an Ollama-compatible
//! endpoint.
//!
//! The pipeline treats the model as a black-box function from messages (plus
//! optional image attachments) to reply text. [`ChatTransport`] is the seam:
//! production code uses [`OllamaClient`], tests substitute a canned
//! implementation without any network.
//!
//! ## Retry strategy
//!
//! Transport and timeout failures are frequently transient (model still
//! loading, endpoint restarting). [`chat_with_retry`] backs off exponentially
//! (`retry_backoff_ms * 2^attempt`); with the 500 ms default and 2 retries
//! the wait sequence is 500 ms → 1 s. Parse/validation failures are not
//! retried here — they are an extraction concern, not a transport one.

use crate::config::AnalysisConfig;
use crate::error::ScanError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// One role/content entry of the conversation, with optional base64 image
/// attachments on user turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
            images: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            images: None,
        }
    }

    pub fn user_with_images(content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            images: Some(images),
        }
    }
}

/// Generation hyperparameters forwarded as the request's `options` map.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOptions {
    pub num_ctx: u32,
    pub num_thread: u32,
    pub num_gpu: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
}

impl GenerationOptions {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            num_ctx: config.num_ctx,
            num_thread: config.num_thread,
            num_gpu: config.num_gpu,
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
        }
    }
}

/// A complete single-shot chat request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Always false: the extractor needs the whole reply in one payload.
    pub stream: bool,
    /// Optional JSON schema for structured outputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    pub options: GenerationOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// The transport seam: send one chat request, get the raw reply text.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<String, ScanError>;
}

/// HTTP client for the Ollama `/api/chat` endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Build a client for the given base URL with a per-call timeout.
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, ScanError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ScanError::Transport {
                status: None,
                detail: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, ScanError> {
        Self::new(&config.base_url, config.api_timeout_secs)
    }
}

#[async_trait]
impl ChatTransport for OllamaClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String, ScanError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!("POST {} (model={})", url, request.model);

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScanError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    ScanError::Transport {
                        status: None,
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::Transport {
                status: Some(status.as_u16()),
                detail: if body.is_empty() {
                    status.to_string()
                } else {
                    body
                },
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| ScanError::Transport {
            status: Some(status.as_u16()),
            detail: format!("malformed response body: {e}"),
        })?;

        parsed
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| ScanError::Transport {
                status: Some(status.as_u16()),
                detail: "response is missing message.content".into(),
            })
    }
}

/// Delay before the given retry attempt (1-based), doubling per attempt.
/// Saturates at `u64::MAX` for extreme configurations instead of overflowing.
fn backoff_delay_ms(retry_backoff_ms: u64, attempt: u32) -> u64 {
    retry_backoff_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Send a chat request, retrying transport/timeout failures with exponential
/// backoff. Returns the reply text and how many retries it took.
pub async fn chat_with_retry(
    transport: &dyn ChatTransport,
    request: &ChatRequest,
    max_retries: u32,
    retry_backoff_ms: u64,
) -> Result<(String, u32), ScanError> {
    let mut last_err: Option<ScanError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = backoff_delay_ms(retry_backoff_ms, attempt);
            warn!(
                "Chat retry {}/{} after {}ms: {}",
                attempt,
                max_retries,
                backoff,
                last_err
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_default()
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match transport.chat(request).await {
            Ok(reply) => return Ok((reply, attempt)),
            Err(e @ (ScanError::Transport { .. } | ScanError::Timeout { .. })) => {
                last_err = Some(e);
            }
            Err(other) => return Err(other),
        }
    }

    Err(last_err.unwrap_or(ScanError::Transport {
        status: None,
        detail: "chat failed with no recorded error".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "llava:7b".into(),
            messages: vec![ChatMessage::user_with_images("look", vec!["aGk=".into()])],
            stream: false,
            format: None,
            options: GenerationOptions::from_config(&AnalysisConfig::default()),
        }
    }

    #[test]
    fn request_serialises_wire_shape() {
        let mut req = request();
        req.format = Some(serde_json::json!({"type": "object"}));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["model"], "llava:7b");
        assert_eq!(v["stream"], false);
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["images"][0], "aGk=");
        assert_eq!(v["options"]["num_ctx"], 1024);
        assert_eq!(v["options"]["top_k"], 40);
        assert_eq!(v["format"]["type"], "object");
    }

    #[test]
    fn system_message_omits_images_key() {
        let v = serde_json::to_value(ChatMessage::system("be careful")).unwrap();
        assert!(v.get("images").is_none());
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_delay_ms(500, 1), 500);
        assert_eq!(backoff_delay_ms(500, 2), 1000);
        assert_eq!(backoff_delay_ms(500, 3), 2000);
        // Extreme configurations clamp instead of panicking.
        assert_eq!(backoff_delay_ms(u64::MAX, 2), u64::MAX);
        assert_eq!(backoff_delay_ms(500, 200), u64::MAX);
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = OllamaClient::new("http://localhost:11434/", 5).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    struct FlakyTransport {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl ChatTransport for FlakyTransport {
        async fn chat(&self, _request: &ChatRequest) -> Result<String, ScanError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n + 1 >= self.succeed_on {
                Ok("{\"ok\":true}".into())
            } else {
                Err(ScanError::Transport {
                    status: Some(503),
                    detail: "loading model".into(),
                })
            }
        }
    }

    #[tokio::test]
    async fn retries_transient_transport_errors() {
        let transport = FlakyTransport {
            calls: AtomicU32::new(0),
            succeed_on: 3,
        };
        let (reply, retries) = chat_with_retry(&transport, &request(), 3, 1).await.unwrap();
        assert_eq!(reply, "{\"ok\":true}");
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_error() {
        let transport = FlakyTransport {
            calls: AtomicU32::new(0),
            succeed_on: 100,
        };
        let err = chat_with_retry(&transport, &request(), 2, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Transport { status: Some(503), .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }
}
