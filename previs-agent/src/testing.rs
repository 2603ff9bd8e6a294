//! In-process LLM double for agent tests

use previs_io::{
    CompletionRequest, FinishReason, LlmProvider, ProviderError, StreamChunk, StreamReceiver,
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays scripted answers in order and records every request
#[derive(Default)]
pub struct MockProvider {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()))
    }

    fn push(self, reply: Result<String, String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| Err("no scripted reply left".to_string()));
        reply.map_err(|message| ProviderError::Api { status: 500, message })
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-1"
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver, ProviderError> {
        let text = self.next(request)?;
        // split in two to exercise accumulation
        let mid = text.char_indices().nth(text.chars().count() / 2).map(|(i, _)| i).unwrap_or(0);
        let (head, tail) = text.split_at(mid);
        Ok(StreamReceiver::from_chunks(vec![
            StreamChunk::Text(head.to_string()),
            StreamChunk::Text(tail.to_string()),
            StreamChunk::Done {
                finish_reason: FinishReason::Stop,
            },
        ]))
    }
}
