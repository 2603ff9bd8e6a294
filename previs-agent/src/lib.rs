//! # previs-agent
//!
//! A small state machine that drives any "invoke -> parse -> validate"
//! pipeline with uniform retry, rollback and error classification:
//! 1. `invoke` produces a raw result (an LLM answer, a process output)
//! 2. `parse` interprets it, or rolls the run back
//! 3. `validate` checks the interpretation, or rolls the run back
//! 4. The run driver repeats steps until `Done` or the retry budget is spent
//!
//! Business failures are data ([`AgentError`] inside the state). Anything
//! else is a [`previs_error::Error`] and aborts the run.
//!
//! The code-writing agents built on top of the engine live here too:
//! [`codegen`] writes new code and [`fixer`] repairs an existing file
//! against a test command.

mod agent;
mod engine;
mod run;
mod types;

pub mod codegen;
pub mod extract;
pub mod fixer;
pub mod prompt;

#[cfg(test)]
mod testing;

pub use agent::{define_agent, Agent, AgentBuilder};
pub use codegen::{codegen, stream_text, CodeRequest, CodegenConfig};
pub use engine::{init_agent, step_agent, step_agent_with};
pub use extract::extract_code_block;
pub use fixer::{fixer, FixConfig, FixInput};
pub use run::{chain, run_agent, Chained, RunOptions, DEFAULT_MAX_RETRIES};
pub use types::{
    AgentError, AgentErrorKind, AgentState, Fault, InvokeOptions, Outcome, Payload, PriorResults,
    Step,
};
