//! # previs-io
//!
//! The collaborators an agent talks to. None of these know about the agent
//! engine; they are narrow, explicitly configured wrappers around the
//! outside world.
//!
//! ## Components
//! - **Provider**: Trait-based LLM communication with an OpenAI-compatible
//!   streaming client
//! - **Preview**: A dev server process plus a health check that blocks until
//!   the preview build answers
//! - **Screenshot**: Headless browser capture with base64 access for vision
//!   models
//! - **Test runner**: Runs a user supplied test command against a file
//! - **Staging**: The `.__previs__` working copy of a target file

pub mod error;
pub mod preview;
pub mod provider;
pub mod screenshot;
pub mod staging;
pub mod test_runner;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use preview::{PreviewConfig, PreviewServer};
pub use provider::{
    ChatMessage, CompletionRequest, ContentPart, FinishReason, LlmProvider, MessageContent,
    OpenAIProvider, ProviderConfig, ProviderError, Role, SseDecoder, SseEvent, StreamChunk,
    StreamReceiver,
};
pub use screenshot::{ScreenshotConfig, Screenshotter};
pub use staging::{read_test_file, staging_path, test_file_path, Staging};
pub use test_runner::{TestCommand, TestReport, TestRunner, FILE_PLACEHOLDER};
