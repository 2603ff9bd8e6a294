//! # Fixer agent
//!
//! Rewrites an existing file according to a request. Each candidate is
//! written to the staging copy of the target and, when a test command is
//! configured, tested there. A failing test becomes a validation failure,
//! and the next invoke sees it through [`PriorResults`] and asks the model
//! to repair its own previous answer.

use crate::agent::Agent;
use crate::codegen::{code_block_parser, stream_text, CodegenConfig};
use crate::prompt;
use crate::types::{AgentError, Fault, InvokeOptions, PriorResults};
use previs_io::error::io_at;
use previs_io::{staging_path, ChatMessage, LlmProvider, TestCommand, TestRunner};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FixConfig {
    /// Model settings
    pub llm: CodegenConfig,
    /// The user's file; candidates go to its staging path
    pub target: PathBuf,
    pub test: Option<TestCommand>,
    pub runner: TestRunner,
}

impl FixConfig {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            llm: CodegenConfig::default(),
            target: target.into(),
            test: None,
            runner: TestRunner::new(),
        }
    }

    pub fn with_llm(mut self, llm: CodegenConfig) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_test(mut self, test: Option<TestCommand>) -> Self {
        self.test = test;
        self
    }

    pub fn with_runner(mut self, runner: TestRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn staged(&self) -> PathBuf {
        staging_path(&self.target)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixInput {
    /// Current contents of the file
    pub code: String,
    pub request: String,
    /// Test source shown to the model, if any
    pub test_code: Option<String>,
    /// Failure text from a test run before the first attempt
    pub failure: Option<String>,
    /// Base64 PNG of the current preview
    pub image: Option<String>,
}

impl FixInput {
    pub fn new(code: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            request: request.into(),
            ..Self::default()
        }
    }

    pub fn with_failure(mut self, failure: Option<String>) -> Self {
        self.failure = failure.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }

    pub fn with_test_code(mut self, test_code: Option<String>) -> Self {
        self.test_code = test_code;
        self
    }
}

/// User prompt for the next attempt
fn build_prompt(lang: &str, input: &FixInput, prior: &PriorResults<String, String>) -> String {
    let test = input.test_code.as_deref();
    match (prior.validation_failure(), prior.parsed_value()) {
        (Some(failure), Some(previous)) => {
            prompt::build_retry_prompt(lang, previous, &input.request, test, &failure.message)
        }
        _ => match &input.failure {
            Some(failure) => prompt::build_retry_prompt(lang, &input.code, &input.request, test, failure),
            None => prompt::build_fix_prompt(lang, &input.code, &input.request, test),
        },
    }
}

/// An agent that fixes a file until its test passes
pub fn fixer<L>(provider: Arc<L>, config: FixConfig) -> Agent<FixConfig, FixInput, String, String>
where
    L: LlmProvider + 'static,
{
    let parse = code_block_parser(config.llm.lang.clone());
    let base = config.clone();
    let checked = config.clone();

    Agent::with_parser(
        config,
        move |input: FixInput, options: InvokeOptions<FixConfig>, prior: PriorResults<String, String>| {
            let provider = Arc::clone(&provider);
            let config = options.resolve(&base);
            async move {
                let llm = &config.llm;
                let user = build_prompt(&llm.lang, &input, &prior);
                let user = match &input.image {
                    Some(image) => ChatMessage::user_with_image(user, image),
                    None => ChatMessage::user(user),
                };
                let system = llm.system.clone().unwrap_or_else(prompt::fix_system_prompt);
                let request = llm.completion_request(vec![ChatMessage::system(system), user]);

                tracing::info!(
                    file = %config.target.display(),
                    retry = prior.validation_failure().is_some(),
                    "fixing code"
                );
                stream_text(provider.as_ref(), request, &options.signal, llm.echo).await
            }
        },
        parse,
    )
    .with_validate(move |code: String| {
        let config = checked.clone();
        async move {
            let staged = config.staged();
            tokio::fs::write(&staged, &code)
                .await
                .map_err(|e| io_at(e, "fixer::validate", &staged))?;

            let Some(test) = &config.test else {
                return Ok(());
            };
            let report = config.runner.run_for(test, &staged).await?;
            if report.passed() {
                tracing::info!(command = %test.display_for(&staged), "test passed");
                Ok(())
            } else {
                tracing::warn!(exit_code = report.exit_code, "test failed");
                Err(Fault::from(AgentError::validation(report.failure_text())))
            }
        }
    })
    .with_description("code fixer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{run_agent, RunOptions};
    use crate::testing::MockProvider;
    use crate::types::AgentErrorKind;
    use tempfile::TempDir;

    fn grep_test(word: &str) -> TestCommand {
        let script = format!(
            "grep -q {w} \"$0\" || {{ echo \"expected {w}\" >&2; exit 1; }}",
            w = word
        );
        TestCommand::new(vec!["sh".into(), "-c".into(), script, "__FILE__".into()]).unwrap()
    }

    #[test]
    fn test_first_prompt_without_failure() {
        let input = FixInput::new("const a = 1;", "rename a");
        let prompt = build_prompt("tsx", &input, &PriorResults::default());
        assert!(prompt.contains("## Request\n\nrename a"));
        assert!(!prompt.contains("## Failed Reason"));
    }

    #[test]
    fn test_seed_failure_goes_into_first_prompt() {
        let input = FixInput::new("x", "Pass tests").with_failure(Some("AssertionError".into()));
        let prompt = build_prompt("tsx", &input, &PriorResults::default());
        assert!(prompt.contains("## Failed Reason\n\nAssertionError"));

        let blank = FixInput::new("x", "r").with_failure(Some("  ".into()));
        assert_eq!(blank.failure, None);
    }

    #[test]
    fn test_retry_prompt_uses_previous_answer() {
        let input = FixInput::new("original", "make it good");
        let prior = PriorResults {
            invoked: Some(Ok("```tsx\nbad\n```".to_string())),
            parsed: Some(Ok("bad".to_string())),
            validated: Some(Err(AgentError::validation("expected good"))),
        };
        let prompt = build_prompt("tsx", &input, &prior);
        assert!(prompt.contains("```tsx\nbad\n```"));
        assert!(!prompt.contains("original"));
        assert!(prompt.contains("expected good"));
    }

    #[tokio::test]
    async fn test_fixes_until_test_passes() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("button.tsx");
        std::fs::write(&target, "export default 'bad';").unwrap();

        let provider = Arc::new(
            MockProvider::new()
                .reply("```tsx\nexport default 'bad';\n```")
                .reply("```tsx\nexport default 'good';\n```"),
        );
        let config = FixConfig::new(&target).with_test(Some(grep_test("good")));
        let agent = fixer(Arc::clone(&provider), config.clone());

        let input = FixInput::new("export default 'bad';", "say good");
        let result = run_agent(&agent, input, RunOptions::default()).await.unwrap();
        assert_eq!(result, Ok("export default 'good';".to_string()));

        // candidate lives in the staging copy; the target is untouched
        assert_eq!(
            std::fs::read_to_string(config.staged()).unwrap(),
            "export default 'good';"
        );
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "export default 'bad';");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let retry = requests[1].messages[1].content.text();
        assert!(retry.contains("## Failed Reason"));
        assert!(retry.contains("expected good"));
    }

    #[tokio::test]
    async fn test_sibling_test_source_is_sent() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("sum.ts");
        std::fs::write(&target, "export const sum = (a, b) => a - b;").unwrap();
        std::fs::write(previs_io::test_file_path(&target), "expect(sum(1, 2)).toBe(3);").unwrap();

        let provider = Arc::new(MockProvider::new().reply("```ts\nexport const sum = (a, b) => a + b;\n```"));
        let agent = fixer(Arc::clone(&provider), FixConfig::new(&target));

        let test_code = previs_io::read_test_file(&target).await.unwrap();
        let input = FixInput::new("export const sum = (a, b) => a - b;", "fix sum").with_test_code(test_code);
        run_agent(&agent, input, RunOptions::default()).await.unwrap().unwrap();

        let prompt = provider.requests()[0].messages[1].content.text();
        assert!(prompt.contains("## Test"));
        assert!(prompt.contains("expect(sum(1, 2)).toBe(3);"));
    }

    #[tokio::test]
    async fn test_reports_last_test_failure() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("card.tsx");

        let provider = Arc::new(
            MockProvider::new()
                .reply("```tsx\nnope\n```")
                .reply("```tsx\nstill nope\n```"),
        );
        let config = FixConfig::new(&target).with_test(Some(grep_test("good")));
        let agent = fixer(provider, config);

        let result = run_agent(&agent, FixInput::new("", "say good"), RunOptions::new().with_max_retries(1))
            .await
            .unwrap();
        let err = result.unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::ValidationError);
        assert_eq!(err.message.trim(), "expected good");
    }

    #[tokio::test]
    async fn test_without_test_command_accepts_first_block() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("plain.tsx");

        let provider = Arc::new(MockProvider::new().reply("```tsx\nfine\n```"));
        let agent = fixer(provider, FixConfig::new(&target));

        let result = run_agent(&agent, FixInput::new("", "anything"), RunOptions::default())
            .await
            .unwrap();
        assert_eq!(result, Ok("fine".to_string()));
        assert_eq!(std::fs::read_to_string(staging_path(&target)).unwrap(), "fine");
    }
}
