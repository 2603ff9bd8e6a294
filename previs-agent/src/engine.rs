//! Step executor
//!
//! One call moves a run across at most one transition:
//!
//! | From        | Action     | Success     | Failure                                  |
//! |-------------|------------|-------------|------------------------------------------|
//! | Initialized | `invoke`   | Invoked     | stays Initialized, `invoked = Err`       |
//! | Invoked     | `parse`    | Parsed      | `parsed = Err`, step = rollback target   |
//! | Parsed      | `validate` | Done        | `validated = Err`, step = rollback target|
//! | Done        | -          | -           | -                                        |
//!
//! Every failure increments `error_count` exactly once. Only business
//! failures ([`Fault::Agent`]) of the kind matching the stage are recorded;
//! anything else is returned as an `Err` and aborts the run.

use crate::agent::Agent;
use crate::types::{AgentError, AgentErrorKind, AgentState, Fault, InvokeOptions, Payload, Step};
use previs_error::{Error, Result};

/// Build the initial state of a run
pub fn init_agent<C, I, V, P>(agent: &Agent<C, I, V, P>, input: I, config: C) -> AgentState<C, I, V, P>
where
    C: Payload,
    I: Payload,
    V: Payload,
    P: Payload,
{
    match &agent.init {
        Some(init) => init(input, config),
        None => AgentState::new(input, config),
    }
}

/// Advance `state` by one transition with default invoke options
pub async fn step_agent<C, I, V, P>(
    agent: &Agent<C, I, V, P>,
    state: AgentState<C, I, V, P>,
) -> Result<AgentState<C, I, V, P>>
where
    C: Payload,
    I: Payload,
    V: Payload,
    P: Payload,
{
    step_agent_with(agent, state, InvokeOptions::default()).await
}

/// Advance `state` by one transition, passing `options` to `invoke`
pub async fn step_agent_with<C, I, V, P>(
    agent: &Agent<C, I, V, P>,
    state: AgentState<C, I, V, P>,
    options: InvokeOptions<C>,
) -> Result<AgentState<C, I, V, P>>
where
    C: Payload,
    I: Payload,
    V: Payload,
    P: Payload,
{
    if let Some(step) = &agent.step {
        return step(state).await;
    }

    match state.step {
        Step::Initialized => invoke_stage(agent, state, options).await,
        Step::Invoked => parse_stage(agent, state).await,
        Step::Parsed => validate_stage(agent, state).await,
        Step::Done => Ok(state),
        Step::Validated => Err(Error::invalid_state("no transition out of Validated")
            .with_operation("engine::step")
            .with_context("error_count", state.error_count.to_string())),
    }
}

async fn invoke_stage<C, I, V, P>(
    agent: &Agent<C, I, V, P>,
    mut state: AgentState<C, I, V, P>,
    options: InvokeOptions<C>,
) -> Result<AgentState<C, I, V, P>>
where
    C: Payload,
    I: Payload,
    V: Payload,
    P: Payload,
{
    let prior = state.prior_results();
    match (agent.invoke)(state.input.clone(), options, prior).await {
        Ok(invoked) => {
            state.invoked = Some(Ok(invoked));
            state.step = Step::Invoked;
            tracing::debug!(from = %Step::Initialized, to = %state.step, "agent step");
        }
        // any business failure of invoke is an invoke failure
        Err(Fault::Agent(e)) => {
            let e = AgentError::invoke(e.message);
            tracing::warn!(error = %e, error_count = state.error_count + 1, "invoke failed");
            state.invoked = Some(Err(e));
            state.error_count += 1;
        }
        Err(Fault::Fatal(e)) => return Err(e),
    }
    Ok(state)
}

async fn parse_stage<C, I, V, P>(
    agent: &Agent<C, I, V, P>,
    mut state: AgentState<C, I, V, P>,
) -> Result<AgentState<C, I, V, P>>
where
    C: Payload,
    I: Payload,
    V: Payload,
    P: Payload,
{
    let invoked = match &state.invoked {
        Some(Ok(value)) => value.clone(),
        _ => {
            return Err(Error::invalid_state("Invoked without a successful invoke result")
                .with_operation("engine::parse"))
        }
    };

    match agent.call_parse(invoked).await {
        Ok(parsed) => {
            state.parsed = Some(Ok(parsed));
            state.step = Step::Parsed;
            tracing::debug!(from = %Step::Invoked, to = %state.step, "agent step");
        }
        Err(Fault::Agent(e)) if e.kind == AgentErrorKind::ParseError => record_failure(&mut state, e, Slot::Parsed),
        Err(Fault::Agent(e)) => return Err(mismatched(Step::Invoked, e)),
        Err(Fault::Fatal(e)) => return Err(e),
    }
    Ok(state)
}

async fn validate_stage<C, I, V, P>(
    agent: &Agent<C, I, V, P>,
    mut state: AgentState<C, I, V, P>,
) -> Result<AgentState<C, I, V, P>>
where
    C: Payload,
    I: Payload,
    V: Payload,
    P: Payload,
{
    let parsed = match &state.parsed {
        Some(Ok(value)) => value.clone(),
        _ => {
            return Err(Error::invalid_state("Parsed without a successful parse result")
                .with_operation("engine::validate"))
        }
    };

    let Some(validate) = &agent.validate else {
        state.validated = Some(Ok(()));
        state.step = Step::Done;
        return Ok(state);
    };

    match validate(parsed).await {
        Ok(()) => {
            state.validated = Some(Ok(()));
            state.step = Step::Done;
            tracing::debug!(from = %Step::Parsed, to = %state.step, "agent step");
        }
        Err(Fault::Agent(e)) if e.kind == AgentErrorKind::ValidationError => {
            record_failure(&mut state, e, Slot::Validated)
        }
        Err(Fault::Agent(e)) => return Err(mismatched(Step::Parsed, e)),
        Err(Fault::Fatal(e)) => return Err(e),
    }
    Ok(state)
}

enum Slot {
    Parsed,
    Validated,
}

fn record_failure<C, I, V, P>(state: &mut AgentState<C, I, V, P>, err: AgentError, slot: Slot) {
    let from = state.step;
    state.step = err.rollback_target();
    state.error_count += 1;
    tracing::warn!(
        error = %err,
        %from,
        rollback = %state.step,
        error_count = state.error_count,
        "stage failed"
    );
    match slot {
        Slot::Parsed => state.parsed = Some(Err(err)),
        Slot::Validated => state.validated = Some(Err(err)),
    }
}

/// A business failure raised from the wrong stage is a programming error
fn mismatched(stage: Step, err: AgentError) -> Error {
    Error::unexpected(format!("{} raised while leaving {}", err, stage))
        .with_operation("engine::step")
        .with_context("kind", err.kind.as_str())
}
