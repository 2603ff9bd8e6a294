//! # Codegen agent
//!
//! Asks the model for code and keeps only the fenced block of the answer.
//! A provider failure is an invoke failure; an answer without a code block
//! is a parse failure, which re-invokes the model.

use crate::agent::Agent;
use crate::extract::extract_code_block;
use crate::prompt;
use crate::types::{AgentError, Fault, InvokeOptions, PriorResults};
use previs_error::Error;
use previs_io::{ChatMessage, CompletionRequest, LlmProvider, StreamChunk};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CodegenConfig {
    /// Model name; the provider default when unset
    pub model: Option<String>,
    /// Language tag of the expected code block
    pub lang: String,
    pub max_tokens: Option<usize>,
    /// Print fragments to stdout as they arrive
    pub echo: bool,
    /// System prompt; a generic "write new code" prompt when unset
    pub system: Option<String>,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            model: None,
            lang: "tsx".to_string(),
            max_tokens: None,
            echo: false,
            system: None,
        }
    }
}

impl CodegenConfig {
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub(crate) fn completion_request(&self, messages: Vec<ChatMessage>) -> CompletionRequest {
        let mut request = CompletionRequest::new(messages);
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        if let Some(max) = self.max_tokens {
            request = request.with_max_tokens(max);
        }
        request
    }
}

/// What to ask the model for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRequest {
    pub prompt: String,
    /// Base64 PNG for vision models
    pub image: Option<String>,
}

impl CodeRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, png_base64: Option<String>) -> Self {
        self.image = png_base64;
        self
    }

    pub(crate) fn user_message(&self) -> ChatMessage {
        match &self.image {
            Some(image) => ChatMessage::user_with_image(self.prompt.clone(), image),
            None => ChatMessage::user(self.prompt.clone()),
        }
    }
}

/// Stream a completion to the end and return the whole text.
///
/// Provider failures are invoke failures. Cancellation is fatal so that a
/// cancelled run stops instead of retrying.
pub async fn stream_text<L: LlmProvider>(
    provider: &L,
    request: CompletionRequest,
    signal: &CancellationToken,
    echo: bool,
) -> Result<String, Fault> {
    let mut receiver = tokio::select! {
        biased;
        _ = signal.cancelled() => return Err(Error::cancelled("llm::stream").into()),
        receiver = provider.stream(request) => receiver.map_err(|e| {
            let err = e.into_error();
            tracing::warn!(kind = %err.kind(), retryable = err.is_retryable(), error = %err, "llm request failed");
            AgentError::invoke(err.message())
        })?,
    };

    let mut text = String::new();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = signal.cancelled() => return Err(Error::cancelled("llm::stream").into()),
            chunk = receiver.next_chunk() => chunk,
        };
        match chunk {
            Some(StreamChunk::Text(fragment)) => {
                if echo {
                    print!("{}", fragment);
                    let _ = std::io::stdout().flush();
                }
                text.push_str(&fragment);
            }
            Some(StreamChunk::Done { finish_reason }) => {
                tracing::debug!(?finish_reason, chars = text.len(), "stream finished");
                break;
            }
            Some(StreamChunk::Error(message)) => return Err(AgentError::invoke(message).into()),
            None => break,
        }
    }
    if echo {
        println!();
    }
    Ok(text)
}

/// Parse step shared by the code-writing agents
pub(crate) fn code_block_parser(
    lang: String,
) -> impl Fn(String) -> futures_util::future::Ready<Result<String, Fault>> + Send + Sync + 'static {
    move |answer: String| {
        futures_util::future::ready(
            extract_code_block(&answer, &lang)
                .ok_or_else(|| Fault::from(AgentError::parse("No code block found"))),
        )
    }
}

/// An agent that writes new code from a request
pub fn codegen<L>(provider: Arc<L>, config: CodegenConfig) -> Agent<CodegenConfig, CodeRequest, String, String>
where
    L: LlmProvider + 'static,
{
    let parse = code_block_parser(config.lang.clone());
    let base = config.clone();

    Agent::with_parser(
        config,
        move |input: CodeRequest, options: InvokeOptions<CodegenConfig>, _prior: PriorResults<String, String>| {
            let provider = Arc::clone(&provider);
            let config = options.resolve(&base);
            async move {
                let system = config.system.clone().unwrap_or_else(prompt::generate_system_prompt);
                let request = config.completion_request(vec![ChatMessage::system(system), input.user_message()]);
                tracing::info!(model = config.model.as_deref().unwrap_or(provider.default_model()), "generating code");
                stream_text(provider.as_ref(), request, &options.signal, config.echo).await
            }
        },
        parse,
    )
    .with_description("code writer")
}
