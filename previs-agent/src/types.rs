//! Core data model of an agent run: stages, business errors, run state

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Stage of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    Initialized,
    Invoked,
    Parsed,
    /// Reserved. The default machine goes from `Parsed` straight to `Done`.
    Validated,
    Done,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Initialized => "Initialized",
            Step::Invoked => "Invoked",
            Step::Parsed => "Parsed",
            Step::Validated => "Validated",
            Step::Done => "Done",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentErrorKind {
    InvokeError,
    ParseError,
    ValidationError,
}

impl AgentErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentErrorKind::InvokeError => "InvokeError",
            AgentErrorKind::ParseError => "ParseError",
            AgentErrorKind::ValidationError => "ValidationError",
        }
    }
}

impl fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An expected failure of one stage, recorded in the run state as data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentError {
    pub kind: AgentErrorKind,
    pub message: String,
    /// Stage to resume from. `None` means `Initialized`.
    #[serde(rename = "rollbackTo", default, skip_serializing_if = "Option::is_none")]
    pub rollback_to: Option<Step>,
}

impl AgentError {
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rollback_to: None,
        }
    }

    pub fn invoke(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::InvokeError, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::ParseError, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::ValidationError, message)
    }

    pub fn rollback_to(mut self, step: Step) -> Self {
        self.rollback_to = Some(step);
        self
    }

    /// Where the run resumes after this failure
    pub fn rollback_target(&self) -> Step {
        self.rollback_to.unwrap_or(Step::Initialized)
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AgentError {}

/// What an agent operation may fail with.
///
/// `Agent` failures are caught by the step executor (when the kind matches
/// the stage) and become part of the state. `Fatal` failures are never
/// caught; they abort the run and surface to the caller.
#[derive(Debug)]
pub enum Fault {
    Agent(AgentError),
    Fatal(previs_error::Error),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Agent(e) => write!(f, "{}", e),
            Fault::Fatal(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Fault {}

impl From<AgentError> for Fault {
    fn from(err: AgentError) -> Self {
        Fault::Agent(err)
    }
}

impl From<previs_error::Error> for Fault {
    fn from(err: previs_error::Error) -> Self {
        Fault::Fatal(err)
    }
}

/// Business result of a stage or a whole run
pub type Outcome<T> = std::result::Result<T, AgentError>;

/// Values that flow through a run. Stages receive owned clones so the
/// state keeps its copy for rollback.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

/// Per-call options handed to `invoke`
#[derive(Debug, Clone)]
pub struct InvokeOptions<C> {
    pub signal: CancellationToken,
    /// Replaces the agent's config for this call when set
    pub overrides: Option<C>,
}

impl<C> Default for InvokeOptions<C> {
    fn default() -> Self {
        Self {
            signal: CancellationToken::new(),
            overrides: None,
        }
    }
}

impl<C: Clone> InvokeOptions<C> {
    /// The config this call should use
    pub fn resolve(&self, base: &C) -> C {
        self.overrides.clone().unwrap_or_else(|| base.clone())
    }
}

/// Stage results accumulated so far, as seen by the next `invoke`
#[derive(Debug, Clone)]
pub struct PriorResults<V, P> {
    pub invoked: Option<Outcome<V>>,
    pub parsed: Option<Outcome<P>>,
    pub validated: Option<Outcome<()>>,
}

impl<V, P> Default for PriorResults<V, P> {
    fn default() -> Self {
        Self {
            invoked: None,
            parsed: None,
            validated: None,
        }
    }
}

impl<V, P> PriorResults<V, P> {
    /// The validation failure of the previous attempt, if that is how it ended
    pub fn validation_failure(&self) -> Option<&AgentError> {
        match &self.validated {
            Some(Err(e)) => Some(e),
            _ => None,
        }
    }

    pub fn parsed_value(&self) -> Option<&P> {
        match &self.parsed {
            Some(Ok(p)) => Some(p),
            _ => None,
        }
    }
}

/// Progress of one run
#[derive(Debug, Clone)]
pub struct AgentState<C, I, V, P> {
    pub step: Step,
    pub input: I,
    pub config: C,
    /// Failed transitions so far. Never reset, not even by a rollback.
    pub error_count: u32,
    pub invoked: Option<Outcome<V>>,
    pub parsed: Option<Outcome<P>>,
    pub validated: Option<Outcome<()>>,
}

impl<C, I, V, P> AgentState<C, I, V, P> {
    pub fn new(input: I, config: C) -> Self {
        Self {
            step: Step::Initialized,
            input,
            config,
            error_count: 0,
            invoked: None,
            parsed: None,
            validated: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.step == Step::Done
    }

    /// The failure of the furthest stage reached: validation, then parse,
    /// then invoke
    pub fn furthest_failure(&self) -> Option<&AgentError> {
        if let Some(Err(e)) = &self.validated {
            return Some(e);
        }
        if let Some(Err(e)) = &self.parsed {
            return Some(e);
        }
        if let Some(Err(e)) = &self.invoked {
            return Some(e);
        }
        None
    }
}

impl<C, I, V: Clone, P: Clone> AgentState<C, I, V, P> {
    pub fn prior_results(&self) -> PriorResults<V, P> {
        PriorResults {
            invoked: self.invoked.clone(),
            parsed: self.parsed.clone(),
            validated: self.validated.clone(),
        }
    }
}
