//! Run driver and chaining

use crate::agent::Agent;
use crate::engine::{init_agent, step_agent_with};
use crate::types::{AgentState, InvokeOptions, Outcome, Payload, Step};
use futures_util::future::BoxFuture;
use previs_error::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct RunOptions<C> {
    /// The run gives up once `error_count` exceeds this
    pub max_retries: u32,
    pub signal: CancellationToken,
    pub overrides: Option<C>,
}

impl<C> Default for RunOptions<C> {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            signal: CancellationToken::new(),
            overrides: None,
        }
    }
}

impl<C: Clone> RunOptions<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_overrides(mut self, overrides: C) -> Self {
        self.overrides = Some(overrides);
        self
    }

    fn invoke_options(&self) -> InvokeOptions<C> {
        InvokeOptions {
            signal: self.signal.clone(),
            overrides: self.overrides.clone(),
        }
    }
}

/// Drive `agent` until it is done or the retry budget is spent.
///
/// Returns `Ok(Ok(parsed))` on success and `Ok(Err(_))` with the failure of
/// the furthest stage reached once `error_count > max_retries`. An `Err` is
/// an infrastructure failure raised by one of the agent's operations, or an
/// inconsistent state.
pub async fn run_agent<C, I, V, P>(
    agent: &Agent<C, I, V, P>,
    input: I,
    options: RunOptions<C>,
) -> Result<Outcome<P>>
where
    C: Payload,
    I: Payload,
    V: Payload,
    P: Payload,
{
    let mut state = init_agent(agent, input, agent.config().clone());

    while state.step != Step::Done {
        state = step_agent_with(agent, state, options.invoke_options()).await?;

        if state.error_count > options.max_retries {
            tracing::warn!(
                error_count = state.error_count,
                max_retries = options.max_retries,
                "retry budget exhausted"
            );
            return exhausted(state);
        }
    }

    match state.parsed {
        Some(parsed) => {
            tracing::debug!(error_count = state.error_count, "agent run done");
            Ok(parsed)
        }
        None => Err(Error::invalid_state("run reached Done without a parsed result")
            .with_operation("run::run_agent")),
    }
}

fn exhausted<C, I, V, P>(state: AgentState<C, I, V, P>) -> Result<Outcome<P>> {
    match state.furthest_failure() {
        Some(err) => Ok(Err(err.clone())),
        None => Err(Error::invalid_state("retry budget exhausted without a recorded failure")
            .with_operation("run::run_agent")
            .with_context("step", state.step.as_str())),
    }
}

/// A reusable pipeline built by [`chain`]
pub type Chained<I, P> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<Outcome<P>>> + Send + Sync>;

/// Run `a`, then feed its parsed output into `b`.
///
/// `b` is never invoked when `a` fails. `a` runs with default options, `b`
/// with `options`.
pub fn chain<CA, IA, VA, PA, CB, VB, PB>(
    a: Agent<CA, IA, VA, PA>,
    b: Agent<CB, PA, VB, PB>,
    options: RunOptions<CB>,
) -> Chained<IA, PB>
where
    CA: Payload,
    IA: Payload,
    VA: Payload,
    PA: Payload,
    CB: Payload,
    VB: Payload,
    PB: Payload,
{
    let a = Arc::new(a);
    let b = Arc::new(b);
    Arc::new(move |input: IA| -> BoxFuture<'static, Result<Outcome<PB>>> {
        let a = Arc::clone(&a);
        let b = Arc::clone(&b);
        let options = options.clone();
        Box::pin(async move {
            let first = match run_agent(&a, input, RunOptions::default()).await? {
                Ok(first) => first,
                Err(e) => return Ok(Err(e)),
            };
            run_agent(&b, first, options).await
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentError, AgentErrorKind, Fault, PriorResults};
    use previs_error::ErrorKind;
    use regex::Regex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn greeter() -> Agent<(), String, String, String> {
        Agent::new((), |input: String, _o: InvokeOptions<()>, _p: PriorResults<String, String>| async move {
            Ok::<_, Fault>(format!("Hello, {}", input))
        })
        .with_parse(|invoked: String| async move {
            let re = Regex::new(r"Hello, (\w+)").map_err(|e| Fault::Fatal(Error::unexpected(e.to_string())))?;
            re.captures(&invoked)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| Fault::from(AgentError::parse("No match")))
        })
        .with_validate(|parsed: String| async move {
            if parsed.chars().next().is_some_and(|c| c.is_uppercase()) {
                Ok(())
            } else {
                Err(Fault::from(AgentError::validation("Not camelcase")))
            }
        })
    }

    fn counting(calls: Arc<AtomicUsize>, fail: bool) -> Agent<(), String, String, String> {
        Agent::new((), move |input: String, _o: InvokeOptions<()>, _p: PriorResults<String, String>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if fail {
                    Err(Fault::from(AgentError::invoke("upstream down")))
                } else {
                    Ok(input)
                }
            }
        })
    }

    #[tokio::test]
    async fn test_end_to_end_greeting() {
        let agent = greeter();

        let result = run_agent(&agent, "John".to_string(), RunOptions::default()).await.unwrap();
        assert_eq!(result, Ok("John".to_string()));

        let result = run_agent(&agent, String::new(), RunOptions::default()).await.unwrap();
        assert_eq!(result, Err(AgentError::parse("No match")));

        let result = run_agent(&agent, "john".to_string(), RunOptions::default()).await.unwrap();
        assert_eq!(result, Err(AgentError::validation("Not camelcase")));
    }

    #[tokio::test]
    async fn test_retry_budget_bounds_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = counting(Arc::clone(&calls), true);

        let result = run_agent(&agent, "x".to_string(), RunOptions::new().with_max_retries(2))
            .await
            .unwrap();

        let err = result.unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::InvokeError);
        assert_eq!(err.message, "upstream down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_fails_on_first_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = counting(Arc::clone(&calls), true);
        let result = run_agent(&agent, "x".to_string(), RunOptions::new().with_max_retries(0))
            .await
            .unwrap();
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_within_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let agent = Agent::new((), move |input: String, _o: InvokeOptions<()>, _p: PriorResults<String, String>| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(Fault::from(AgentError::invoke("flaky")))
                } else {
                    Ok(input)
                }
            }
        });

        let result = run_agent(&agent, "ok".to_string(), RunOptions::default()).await.unwrap();
        assert_eq!(result, Ok("ok".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    // error_count is cumulative across stages and survives rollbacks, so
    // failures alternating between parse and validate share one budget.
    #[tokio::test]
    async fn test_error_count_is_shared_across_stages() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let agent = Agent::new((), |input: String, _o: InvokeOptions<()>, _p: PriorResults<String, String>| async move {
            Ok::<_, Fault>(input)
        })
        .with_parse(move |invoked: String| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n % 2 == 0 {
                    Err(Fault::from(AgentError::parse("odd attempt")))
                } else {
                    Ok(invoked)
                }
            }
        })
        .with_validate(|_parsed: String| async { Err(Fault::from(AgentError::validation("never good"))) });

        let result = run_agent(&agent, "x".to_string(), RunOptions::new().with_max_retries(3))
            .await
            .unwrap();

        // parse, validate, parse, validate: four failures exhaust a budget of three
        assert_eq!(result, Err(AgentError::validation("never good")));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_run() {
        let agent = Agent::new((), |_i: String, _o: InvokeOptions<()>, _p: PriorResults<String, String>| async {
            Err::<String, _>(Fault::Fatal(Error::invalid_argument("bad input")))
        });
        let err = run_agent(&agent, "x".to_string(), RunOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_done_without_parsed_is_invalid_state() {
        let agent = Agent::new((), |i: String, _o: InvokeOptions<()>, _p: PriorResults<String, String>| async move {
            Ok::<_, Fault>(i)
        })
        .with_step(|mut state: AgentState<(), String, String, String>| async move {
            state.step = Step::Done;
            Ok::<_, Error>(state)
        });

        let err = run_agent(&agent, "x".to_string(), RunOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.operation(), "run::run_agent");
    }

    #[tokio::test]
    async fn test_overrides_reach_invoke() {
        let agent = Agent::new("base".to_string(), |_i: String, options: InvokeOptions<String>, _p: PriorResults<String, String>| async move {
            Ok::<_, Fault>(options.overrides.unwrap_or_default())
        });
        let options = RunOptions::new().with_overrides("override".to_string());
        let result = run_agent(&agent, "x".to_string(), options).await.unwrap();
        assert_eq!(result, Ok("override".to_string()));
    }

    #[tokio::test]
    async fn test_chain_pipes_output() {
        let upper = Agent::new((), |input: String, _o: InvokeOptions<()>, _p: PriorResults<String, String>| async move {
            Ok::<_, Fault>(input.to_uppercase())
        });
        let pipeline = chain(greeter(), upper, RunOptions::default());

        assert_eq!(pipeline("Ada".to_string()).await.unwrap(), Ok("ADA".to_string()));
        assert_eq!(pipeline("Bob".to_string()).await.unwrap(), Ok("BOB".to_string()));
    }

    #[tokio::test]
    async fn test_chain_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let second = counting(Arc::clone(&calls), false);
        let pipeline = chain(greeter(), second, RunOptions::default());

        let result = pipeline("john".to_string()).await.unwrap();
        assert_eq!(result, Err(AgentError::validation("Not camelcase")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
