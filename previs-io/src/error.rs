//! Collaborator error helpers
//!
//! Re-exports previs-error and provides IO-specific conveniences.

pub use previs_error::{Error, ErrorKind, ErrorStatus, Result};

use std::time::Duration;

/// Create a BuildTimeout error
pub fn build_timeout(url: impl Into<String>, waited: Duration) -> Error {
    let url = url.into();
    Error::new(
        ErrorKind::BuildTimeout,
        format!("{} not healthy after {}ms", url, waited.as_millis()),
    )
    .with_context("url", url)
}

/// Create a ProcessFailed error for a program that could not be spawned
pub fn spawn_failed(program: impl Into<String>, err: std::io::Error) -> Error {
    let program = program.into();
    Error::process_failed(program.clone(), format!("failed to spawn '{}': {}", program, err))
        .set_source(err)
}

/// Create a ProcessFailed error for a program that exited abnormally
pub fn exited(program: impl Into<String>, code: Option<i32>, stderr: &str) -> Error {
    let code = code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string());
    Error::process_failed(program, stderr.trim().to_string()).with_context("exit", code)
}

/// Create an InvalidArgument error
pub fn invalid_argument(message: impl Into<String>) -> Error {
    Error::invalid_argument(message)
}

/// Attach a path to an IO error
pub fn io_at(err: std::io::Error, operation: &'static str, path: &std::path::Path) -> Error {
    Error::from(err)
        .with_operation(operation)
        .with_context("path", path.display().to_string())
}
