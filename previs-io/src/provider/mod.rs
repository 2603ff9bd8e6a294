//! # LLM Provider Interface
//!
//! A trait-based abstraction for communicating with LLM backends.
//!
//! ## Design
//! - `LlmProvider` trait defines the core interface
//! - One implementation for OpenAI-compatible endpoints
//! - Streaming via async streams of `StreamChunk`
//! - Messages may carry images for vision-capable models

pub mod openai;
pub mod sse;

pub use openai::OpenAIProvider;
pub use sse::{SseDecoder, SseEvent};

use crate::error::{Error, ErrorKind};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

// ============================================================================
// Core Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a multi-part message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Message body: plain text, or text and images for vision models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of the message, ignoring images
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(self, MessageContent::Parts(parts)
            if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }
}

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// User message with a base64 PNG attached as a data URL
    pub fn user_with_image(content: impl Into<String>, png_base64: &str) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: content.into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{}", png_base64),
                    },
                },
            ]),
        }
    }
}

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub stop: Option<Vec<String>>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// True if any message carries an image
    pub fn has_image(&self) -> bool {
        self.messages.iter().any(|m| m.content.has_image())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    pub fn from_api(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    }
}

/// A streaming chunk from the model
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text content delta
    Text(String),
    /// Stream finished
    Done { finish_reason: FinishReason },
    /// Error occurred mid-stream
    Error(String),
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Error type for provider operations
#[derive(Debug)]
pub enum ProviderError {
    /// Network/connection error
    Network(String),
    /// API returned an error
    Api { status: u16, message: String },
    /// Rate limited
    RateLimited { retry_after: Option<u64> },
    /// Authentication failed
    AuthenticationFailed,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Self::RateLimited { retry_after } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after {
                    write!(f, " (retry after {}s)", secs)?;
                }
                Ok(())
            }
            Self::AuthenticationFailed => write!(f, "Authentication failed"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Classify as an infrastructure error so callers can tell a flaky
    /// endpoint from a request that will never succeed.
    pub fn into_error(self) -> Error {
        let message = self.to_string();
        let err = match self {
            Self::Network(_) => Error::new(ErrorKind::NetworkFailed, message),
            Self::Api { status, .. } if status >= 500 => {
                Error::new(ErrorKind::ProviderUnavailable, message).with_context("status", status.to_string())
            }
            Self::Api { status, .. } => Error::inference_failed(message)
                .permanent()
                .with_context("status", status.to_string()),
            Self::RateLimited { retry_after } => {
                let err = Error::new(ErrorKind::RateLimited, message);
                match retry_after {
                    Some(secs) => err.with_context("retry_after", secs.to_string()),
                    None => err,
                }
            }
            Self::AuthenticationFailed => Error::config_invalid("OPENAI_API_KEY", message),
        };
        err.with_operation("llm::stream")
    }
}

/// The main LLM provider trait
///
/// Futures are `Send` so an agent can box them and hold them across
/// `.await` points on a multi-threaded runtime.
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai")
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Send a completion request and stream the response
    fn stream(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<StreamReceiver, ProviderError>> + Send;
}

/// Receiver for streaming responses
pub struct StreamReceiver {
    inner: Pin<Box<dyn futures_core::Stream<Item = StreamChunk> + Send>>,
}

impl StreamReceiver {
    pub fn new<S>(stream: S) -> Self
    where
        S: futures_core::Stream<Item = StreamChunk> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Build a receiver that replays the given chunks
    pub fn from_chunks(chunks: Vec<StreamChunk>) -> Self {
        Self::new(futures_util::stream::iter(chunks))
    }

    /// Next chunk, or `None` once the stream is exhausted
    pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
        self.inner.next().await
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: Some("https://api.openai.com/v1".into()),
            default_model: Some("gpt-4o".into()),
            headers: HashMap::new(),
            timeout_secs: Some(300),
        }
    }

    /// An OpenAI-compatible server that needs no key (vLLM, Ollama, ...)
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            headers: HashMap::new(),
            timeout_secs: Some(300),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are a programmer");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.content.text(), "You are a programmer");

        let user = ChatMessage::user("Fix the button");
        assert_eq!(user.role, Role::User);
        assert!(!user.content.has_image());
    }

    #[test]
    fn test_image_message_serializes_as_parts() {
        let msg = ChatMessage::user_with_image("Look", "AAAA");
        assert!(msg.content.has_image());

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_text_message_serializes_as_string() {
        let json = serde_json::to_value(ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json["content"], "ok");
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("Hello")])
            .with_model("gpt-4o")
            .with_temperature(0.2)
            .with_max_tokens(1000);

        assert_eq!(request.model, Some("gpt-4o".into()));
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(1000));
        assert!(!request.has_image());
    }

    #[test]
    fn test_provider_config() {
        let config = ProviderConfig::openai("sk-test").with_model("gpt-4o-mini");
        assert_eq!(config.default_model, Some("gpt-4o-mini".into()));
        assert_eq!(config.base_url.as_deref(), Some("https://api.openai.com/v1"));

        let config = ProviderConfig::local("http://localhost:11434/v1", "llama3");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_provider_error_classification() {
        let err = ProviderError::Network("connection reset".into()).into_error();
        assert_eq!(err.kind(), ErrorKind::NetworkFailed);
        assert!(err.is_retryable());
        assert_eq!(err.operation(), "llm::stream");

        let err = ProviderError::Api { status: 503, message: "overloaded".into() }.into_error();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert!(err.is_retryable());

        let err = ProviderError::Api { status: 400, message: "bad image".into() }.into_error();
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert!(!err.is_retryable());
        assert_eq!(err.context()[0], ("status", "400".to_string()));

        let err = ProviderError::RateLimited { retry_after: Some(20) }.into_error();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.context()[0], ("retry_after", "20".to_string()));

        let err = ProviderError::AuthenticationFailed.into_error();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_receiver_replays_chunks() {
        let mut rx = StreamReceiver::from_chunks(vec![
            StreamChunk::Text("Hello".into()),
            StreamChunk::Done {
                finish_reason: FinishReason::Stop,
            },
        ]);
        assert_eq!(rx.next_chunk().await, Some(StreamChunk::Text("Hello".into())));
        assert!(matches!(rx.next_chunk().await, Some(StreamChunk::Done { .. })));
        assert_eq!(rx.next_chunk().await, None);
    }
}
