//! Agent descriptor: a config plus up to five operations

use crate::types::{AgentState, Fault, InvokeOptions, Payload, PriorResults};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

pub type InvokeFn<C, I, V, P> = Arc<
    dyn Fn(I, InvokeOptions<C>, PriorResults<V, P>) -> BoxFuture<'static, Result<V, Fault>>
        + Send
        + Sync,
>;
pub type ParseFn<V, P> = Arc<dyn Fn(V) -> BoxFuture<'static, Result<P, Fault>> + Send + Sync>;
pub type ValidateFn<P> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<(), Fault>> + Send + Sync>;
pub type InitFn<C, I, V, P> = Arc<dyn Fn(I, C) -> AgentState<C, I, V, P> + Send + Sync>;
pub type StepFn<C, I, V, P> = Arc<
    dyn Fn(AgentState<C, I, V, P>) -> BoxFuture<'static, previs_error::Result<AgentState<C, I, V, P>>>
        + Send
        + Sync,
>;

/// How `Invoked` becomes `Parsed`
pub(crate) enum ParseOp<V, P> {
    /// No parse given; only constructible when `P = V`
    Identity(fn(V) -> P),
    Custom(ParseFn<V, P>),
}

impl<V, P> Clone for ParseOp<V, P> {
    fn clone(&self) -> Self {
        match self {
            ParseOp::Identity(f) => ParseOp::Identity(*f),
            ParseOp::Custom(f) => ParseOp::Custom(Arc::clone(f)),
        }
    }
}

fn identity<V>(value: V) -> V {
    value
}

/// A stateless behavior descriptor. All progress lives in [`AgentState`].
pub struct Agent<C, I, V, P = V> {
    pub(crate) config: C,
    pub(crate) description: Option<String>,
    pub(crate) invoke: InvokeFn<C, I, V, P>,
    pub(crate) parse: ParseOp<V, P>,
    pub(crate) validate: Option<ValidateFn<P>>,
    pub(crate) init: Option<InitFn<C, I, V, P>>,
    pub(crate) step: Option<StepFn<C, I, V, P>>,
}

impl<C: Clone, I, V, P> Clone for Agent<C, I, V, P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            description: self.description.clone(),
            invoke: Arc::clone(&self.invoke),
            parse: self.parse.clone(),
            validate: self.validate.clone(),
            init: self.init.clone(),
            step: self.step.clone(),
        }
    }
}

impl<C: std::fmt::Debug, I, V, P> std::fmt::Debug for Agent<C, I, V, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("description", &self.description)
            .field("parse", &matches!(self.parse, ParseOp::Custom(_)))
            .field("validate", &self.validate.is_some())
            .field("init", &self.init.is_some())
            .field("step", &self.step.is_some())
            .finish()
    }
}

fn box_invoke<C, I, V, P, F, Fut>(invoke: F) -> InvokeFn<C, I, V, P>
where
    C: Payload,
    I: Payload,
    V: Payload,
    P: Payload,
    F: Fn(I, InvokeOptions<C>, PriorResults<V, P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, Fault>> + Send + 'static,
{
    Arc::new(
        move |input: I,
              options: InvokeOptions<C>,
              prior: PriorResults<V, P>|
              -> BoxFuture<'static, Result<V, Fault>> {
            Box::pin(invoke(input, options, prior))
        },
    )
}

fn box_parse<V, P, F, Fut>(parse: F) -> ParseFn<V, P>
where
    V: Payload,
    P: Payload,
    F: Fn(V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P, Fault>> + Send + 'static,
{
    Arc::new(move |invoked: V| -> BoxFuture<'static, Result<P, Fault>> {
        Box::pin(parse(invoked))
    })
}

impl<C: Payload, I: Payload, V: Payload> Agent<C, I, V, V> {
    /// An agent whose parsed value is the invoked value unchanged
    pub fn new<F, Fut>(config: C, invoke: F) -> Self
    where
        F: Fn(I, InvokeOptions<C>, PriorResults<V, V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, Fault>> + Send + 'static,
    {
        Self::from_parts(config, box_invoke(invoke), ParseOp::Identity(identity::<V>))
    }
}

impl<C: Payload, I: Payload, V: Payload, P: Payload> Agent<C, I, V, P> {
    pub fn with_parser<F, Fut, G, GFut>(config: C, invoke: F, parse: G) -> Self
    where
        F: Fn(I, InvokeOptions<C>, PriorResults<V, P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, Fault>> + Send + 'static,
        G: Fn(V) -> GFut + Send + Sync + 'static,
        GFut: Future<Output = Result<P, Fault>> + Send + 'static,
    {
        Self::from_parts(config, box_invoke(invoke), ParseOp::Custom(box_parse(parse)))
    }

    fn from_parts(config: C, invoke: InvokeFn<C, I, V, P>, parse: ParseOp<V, P>) -> Self {
        Self {
            config,
            description: None,
            invoke,
            parse,
            validate: None,
            init: None,
            step: None,
        }
    }

    /// Replace the parse operation
    pub fn with_parse<G, GFut>(mut self, parse: G) -> Self
    where
        G: Fn(V) -> GFut + Send + Sync + 'static,
        GFut: Future<Output = Result<P, Fault>> + Send + 'static,
    {
        self.parse = ParseOp::Custom(box_parse(parse));
        self
    }

    pub fn with_validate<H, HFut>(mut self, validate: H) -> Self
    where
        H: Fn(P) -> HFut + Send + Sync + 'static,
        HFut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.validate = Some(Arc::new(
            move |parsed: P| -> BoxFuture<'static, Result<(), Fault>> { Box::pin(validate(parsed)) },
        ));
        self
    }

    /// Override how the initial state is built
    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: Fn(I, C) -> AgentState<C, I, V, P> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Replace the built-in state machine entirely
    pub fn with_step<F, Fut>(mut self, step: F) -> Self
    where
        F: Fn(AgentState<C, I, V, P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = previs_error::Result<AgentState<C, I, V, P>>> + Send + 'static,
    {
        self.step = Some(Arc::new(
            move |state: AgentState<C, I, V, P>| -> BoxFuture<
                'static,
                previs_error::Result<AgentState<C, I, V, P>>,
            > { Box::pin(step(state)) },
        ));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn has_custom_step(&self) -> bool {
        self.step.is_some()
    }

    pub(crate) async fn call_parse(&self, invoked: V) -> Result<P, Fault> {
        match &self.parse {
            ParseOp::Identity(f) => Ok(f(invoked)),
            ParseOp::Custom(f) => f(invoked).await,
        }
    }
}

/// Builds an [`Agent`] from a config
pub struct AgentBuilder<C, I, V, P = V> {
    build: Arc<dyn Fn(C) -> Agent<C, I, V, P> + Send + Sync>,
}

impl<C, I, V, P> Clone for AgentBuilder<C, I, V, P> {
    fn clone(&self) -> Self {
        Self {
            build: Arc::clone(&self.build),
        }
    }
}

impl<C, I, V, P> AgentBuilder<C, I, V, P> {
    pub fn build(&self, config: C) -> Agent<C, I, V, P> {
        (self.build)(config)
    }
}

/// Wrap an agent constructor so it can be handed around and reused
pub fn define_agent<C, I, V, P, F>(f: F) -> AgentBuilder<C, I, V, P>
where
    F: Fn(C) -> Agent<C, I, V, P> + Send + Sync + 'static,
{
    AgentBuilder { build: Arc::new(f) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentError;

    async fn echo(
        input: String,
        _options: InvokeOptions<()>,
        _prior: PriorResults<String, String>,
    ) -> Result<String, Fault> {
        Ok(input)
    }

    #[tokio::test]
    async fn test_identity_parse_when_absent() {
        let agent = Agent::new((), echo);
        assert_eq!(agent.call_parse("same".to_string()).await.unwrap(), "same");
        assert!(agent.validate.is_none());
        assert!(!agent.has_custom_step());
    }

    #[tokio::test]
    async fn test_with_parse_replaces_identity() {
        let agent = Agent::new((), echo).with_parse(|s: String| async move {
            if s.is_empty() {
                Err(Fault::from(AgentError::parse("empty")))
            } else {
                Ok(s.to_uppercase())
            }
        });
        assert_eq!(agent.call_parse("abc".to_string()).await.unwrap(), "ABC");
        assert!(agent.call_parse(String::new()).await.is_err());
    }

    #[test]
    fn test_define_agent_builds_from_config() {
        let builder = define_agent(|greeting: String| {
            Agent::new(greeting, |name: String, options: InvokeOptions<String>, _prior: PriorResults<String, String>| async move {
                Ok::<_, Fault>(format!("{} {}", options.overrides.unwrap_or_default(), name))
            })
            .with_description("greeter")
        });
        let agent = builder.build("Hello".to_string());
        assert_eq!(agent.config(), "Hello");
        assert_eq!(agent.description(), Some("greeter"));

        let again = builder.clone().build("Hi".to_string());
        assert_eq!(again.config(), "Hi");
    }
}
