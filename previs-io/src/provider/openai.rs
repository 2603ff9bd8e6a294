//! OpenAI-compatible provider implementation
//!
//! Works with OpenAI, Azure OpenAI, vLLM, Ollama, and other OpenAI-compatible APIs.

use super::*;
use crate::error::{Error, ErrorKind};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Vision requests get a completion budget when the caller sets none;
/// some vision endpoints otherwise cut the answer off after a few tokens.
const VISION_MAX_TOKENS: usize = 4096;

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(300)))
            .build()
            .map_err(|e| {
                Error::new(ErrorKind::ConfigInvalid, "failed to create HTTP client")
                    .with_operation("openai::new")
                    .set_source(e)
            })?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or("https://api.openai.com/v1")
    }

    fn build_request(&self, request: &CompletionRequest) -> OpenAIRequest {
        let model = request.model.as_deref().unwrap_or(self.default_model());
        let max_tokens = request
            .max_tokens
            .or_else(|| request.has_image().then_some(VISION_MAX_TOKENS));

        OpenAIRequest {
            model: model.to_string(),
            messages: request.messages.clone(),
            temperature: request.temperature,
            max_tokens,
            stream: true,
            stop: request.stop.clone(),
        }
    }

    async fn send(&self, body: &OpenAIRequest) -> Result<reqwest::Response, ProviderError> {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url()))
            .json(body);

        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
        }

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(match status {
                429 => ProviderError::RateLimited { retry_after },
                401 => ProviderError::AuthenticationFailed,
                _ => ProviderError::Api {
                    status,
                    message: text,
                },
            });
        }

        Ok(response)
    }
}

impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("gpt-4o")
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver, ProviderError> {
        let body = self.build_request(&request);
        tracing::debug!(model = %body.model, messages = body.messages.len(), "openai stream request");
        let response = self.send(&body).await?;

        let stream = async_stream::stream! {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield StreamChunk::Error(e.to_string());
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    match event {
                        SseEvent::Done => {
                            yield StreamChunk::Done { finish_reason: FinishReason::Stop };
                            return;
                        }
                        SseEvent::Data(data) => {
                            for chunk in decode_stream_data(&data) {
                                yield chunk;
                            }
                        }
                    }
                }
            }

            for event in decoder.finish() {
                if let SseEvent::Data(data) = event {
                    for chunk in decode_stream_data(&data) {
                        yield chunk;
                    }
                }
            }
        };

        Ok(StreamReceiver::new(stream))
    }
}

/// Turn one `data:` payload into stream chunks
fn decode_stream_data(data: &str) -> Vec<StreamChunk> {
    let chunk = match serde_json::from_str::<OpenAIStreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed stream frame");
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                out.push(StreamChunk::Text(content));
            }
        }
        if let Some(reason) = choice.finish_reason {
            out.push(StreamChunk::Done {
                finish_reason: FinishReason::from_api(Some(&reason)),
            });
        }
    }
    out
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}
