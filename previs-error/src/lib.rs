//! # previs-error
//!
//! Unified infrastructure error handling for previs.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., NetworkFailed, BuildTimeout)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! Business failures of an agent run (invoke/parse/validation) are NOT
//! modelled here; they live in `previs-agent` as plain data. This crate is
//! for everything that should abort a run.
//!
//! ## Usage
//!
//! ```rust
//! use previs_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::ProcessFailed, "browser exited with status 1")
//!         .with_operation("screenshot::capture")
//!         .with_context("browser", "chromium"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All fallible infrastructure returns `Result<T, previs_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the previs Error
pub type Result<T> = std::result::Result<T, Error>;
