//! Subcommand implementations

use crate::config::Settings;
use crate::TargetArgs;
use previs_agent::extract::lang_for;
use previs_agent::prompt::build_generate_prompt;
use previs_agent::{
    codegen, fixer, run_agent, AgentError, AgentErrorKind, CodeRequest, CodegenConfig, FixConfig,
    FixInput, RunOptions,
};
use previs_error::{Error, ErrorKind, Result};
use previs_io::{
    read_test_file, OpenAIProvider, PreviewServer, Screenshotter, Staging, TestCommand, TestReport,
    TestRunner,
};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const STUB: &str = "export default function Preview() {\n  return <div />;\n}\n";

/// `400px` or `400` -> 400
pub fn parse_px(value: &str) -> Result<u32> {
    let trimmed = value.trim();
    let digits = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
    digits.parse::<u32>().map_err(|e| {
        Error::invalid_argument(format!("invalid pixel size '{}'", value)).set_source(e)
    })
}

/// Answer to `Accept? [y/N/<request>]`
#[derive(Debug, PartialEq, Eq)]
enum Answer {
    Accept,
    Reject,
    Request(String),
}

fn parse_answer(line: &str) -> Answer {
    match line.trim() {
        "y" | "Y" | "yes" => Answer::Accept,
        "" | "n" | "N" | "no" => Answer::Reject,
        other => Answer::Request(other.to_string()),
    }
}

/// Run `fut` unless Ctrl+C comes first
async fn until_cancelled<T>(
    signal: &CancellationToken,
    operation: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(Error::cancelled(operation)),
        out = fut => out,
    }
}

/// Ask for one line of input; Ctrl+C aborts the prompt
async fn ask(prompt: &str, signal: &CancellationToken) -> Result<String> {
    until_cancelled(signal, "cli::ask", read_line(prompt.to_string())).await
}

/// Read one line from stdin without blocking the runtime
async fn read_line(prompt: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok::<_, std::io::Error>(line.trim().to_string())
    })
    .await
    .map_err(|e| Error::unexpected("input task failed").set_source(e))?
    .map_err(Error::from)
}

/// Cancelled on Ctrl+C.
///
/// Once tokio owns SIGINT the default handler never comes back, so every
/// wait of a command must select on this token.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            child.cancel();
        }
    });
    token
}

fn require_target(args: &TargetArgs) -> Result<&Path> {
    args.target
        .as_deref()
        .ok_or_else(|| Error::invalid_argument("a target file is required"))
}

fn test_command(args: &TargetArgs) -> Result<Option<TestCommand>> {
    if args.test_cmd.is_empty() {
        Ok(None)
    } else {
        TestCommand::new(args.test_cmd.clone()).map(Some)
    }
}

/// `.ts` files are logic; everything else is rendered in the preview
fn is_ui(target: &Path) -> bool {
    !target.to_string_lossy().ends_with(".ts")
}

fn provider(settings: &Settings, args: &TargetArgs) -> Result<Arc<OpenAIProvider>> {
    let config = settings.provider_config(args.model.as_deref())?;
    Ok(Arc::new(OpenAIProvider::new(config)?))
}

fn llm_config(args: &TargetArgs, target: &Path) -> CodegenConfig {
    CodegenConfig::default()
        .with_model(args.model.clone())
        .with_lang(match lang_for(target) {
            "" => "tsx",
            lang => lang,
        })
        .with_echo(true)
}

fn preview_cwd(target: Option<&Path>) -> Option<PathBuf> {
    target
        .and_then(|t| t.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// A business failure that ends a command
fn run_failed(err: AgentError) -> Error {
    let kind = match err.kind {
        AgentErrorKind::InvokeError => ErrorKind::InferenceFailed,
        AgentErrorKind::ParseError => ErrorKind::ParseFailed,
        AgentErrorKind::ValidationError => ErrorKind::ProcessFailed,
    };
    Error::new(kind, err.message).with_context("stage", err.kind.as_str())
}

fn print_report(label: &str, report: &TestReport) {
    if report.passed() {
        println!("{}: passed", label);
    } else {
        println!("{}: failed (exit {})", label, report.exit_code);
        let text = report.failure_text();
        if !text.trim().is_empty() {
            println!("{}", text.trim_end());
        }
    }
}

/// Preview plus screenshots for UI targets
struct Visual {
    server: PreviewServer,
    shooter: Screenshotter,
    vision: bool,
}

impl Visual {
    fn start(settings: &Settings, args: &TargetArgs, target: Option<&Path>) -> Result<Self> {
        let config = settings.preview_config(args.port, preview_cwd(target));
        let server = PreviewServer::start(config)?;
        let width = args.width.as_deref().map(parse_px).transpose()?;
        let height = args.height.as_deref().map(parse_px).transpose()?;
        let output = std::env::temp_dir().join("previs-screenshot.png");
        let shooter = Screenshotter::new(settings.screenshot_config(output, width, height));
        Ok(Self {
            server,
            shooter,
            vision: args.vision,
        })
    }

    /// Wait for the build, capture it, and return the image when vision is on
    async fn capture(&mut self, signal: &CancellationToken) -> Result<Option<String>> {
        wait_for_build(&mut self.server, signal).await?;
        until_cancelled(signal, "screenshot::capture", self.shooter.screenshot(&self.server.url())).await?;
        println!("screenshot: {}", self.shooter.path().display());
        if self.vision {
            Ok(Some(self.shooter.base64_image().await?))
        } else {
            Ok(None)
        }
    }

    async fn dispose(self) -> Result<()> {
        self.server.dispose().await
    }
}

/// Wait for the preview, giving a slow first build one more window
async fn wait_for_build(server: &mut PreviewServer, signal: &CancellationToken) -> Result<()> {
    match until_cancelled(signal, "preview::ensure_build", server.ensure_build()).await {
        Err(e) if e.is_retryable() => {
            tracing::warn!(error = %e, "preview not ready yet, waiting once more");
            until_cancelled(signal, "preview::ensure_build", server.ensure_build())
                .await
                .map_err(Error::persist)
        }
        other => other,
    }
}

/// Replace the target with the staged copy, or drop the copy.
/// Returns whether the target was replaced.
async fn settle(staging: Staging, decision: Result<bool>) -> Result<bool> {
    match decision {
        Ok(true) => {
            staging.accept().await?;
            Ok(true)
        }
        Ok(false) => {
            staging.discard().await?;
            Ok(false)
        }
        Err(e) => {
            if let Err(discard) = staging.discard().await {
                tracing::warn!(error = %discard, "failed to remove staged copy");
            }
            Err(e)
        }
    }
}

/// `previs <target>`
pub async fn fix_or_generate(settings: &Settings, args: &TargetArgs) -> Result<()> {
    let target = require_target(args)?;
    if target.exists() {
        fix(settings, args).await
    } else {
        generate(settings, args).await
    }
}

pub async fn fix(settings: &Settings, args: &TargetArgs) -> Result<()> {
    let target = require_target(args)?;
    if !target.is_file() {
        return Err(Error::new(ErrorKind::FileNotFound, format!("{} does not exist", target.display())));
    }
    let test = test_command(args)?;
    if args.auto && test.is_none() {
        return Err(Error::invalid_argument("--auto needs a test command after `--`"));
    }

    let provider = provider(settings, args)?;
    let staging = Staging::begin(target).await?;
    let mut visual = match is_ui(target) {
        true => match Visual::start(settings, args, Some(target)) {
            Ok(visual) => Some(visual),
            Err(e) => return settle(staging, Err(e)).await.map(|_| ()),
        },
        false => None,
    };

    let signal = interrupt_token();
    let decision = fix_loop(args, target, test, &provider, &staging, visual.as_mut(), &signal).await;

    if let Some(visual) = visual.take() {
        if let Err(e) = visual.dispose().await {
            tracing::warn!(error = %e, "failed to stop preview");
        }
    }

    if settle(staging, decision).await? {
        println!("updated {}", target.display());
    } else {
        println!("discarded");
    }
    Ok(())
}

/// Returns whether the staged result should replace the target
async fn fix_loop(
    args: &TargetArgs,
    target: &Path,
    test: Option<TestCommand>,
    provider: &Arc<OpenAIProvider>,
    staging: &Staging,
    mut visual: Option<&mut Visual>,
    signal: &CancellationToken,
) -> Result<bool> {
    let runner = TestRunner::new();

    let mut image = match visual.as_deref_mut() {
        Some(v) => v.capture(signal).await?,
        None => None,
    };

    let test_code = read_test_file(target).await?;
    let mut failure = match &test {
        Some(cmd) => {
            let report = until_cancelled(signal, "test::run", runner.run_for(cmd, staging.path())).await?;
            print_report(&cmd.display_for(staging.path()), &report);
            (!report.passed()).then(|| report.failure_text())
        }
        None => None,
    };

    let mut request = match (&args.request, args.auto) {
        (Some(request), _) => request.clone(),
        (None, true) => "Pass tests".to_string(),
        (None, false) => ask("Request > ", signal).await?,
    };

    let config = FixConfig::new(target)
        .with_llm(llm_config(args, target))
        .with_test(test)
        .with_runner(runner);
    let agent = fixer(Arc::clone(provider), config);

    loop {
        let input = FixInput::new(staging.read().await?, request.clone())
            .with_failure(failure.take())
            .with_image(image.take())
            .with_test_code(test_code.clone());
        let options = RunOptions::new()
            .with_max_retries(args.max_retries)
            .with_signal(signal.clone());

        match until_cancelled(signal, "cli::fix", run_agent(&agent, input, options)).await? {
            Ok(code) => {
                staging.write(&code).await?;
                if let Some(v) = visual.as_deref_mut() {
                    image = v.capture(signal).await?;
                }
                if args.auto {
                    return Ok(true);
                }
            }
            Err(e) if args.auto => return Err(run_failed(e)),
            Err(e) => {
                println!("could not satisfy the request: {}", e);
                if e.kind == AgentErrorKind::ValidationError {
                    failure = Some(e.message);
                }
            }
        }

        match parse_answer(&ask("Accept? [y/N/<request>] ", signal).await?) {
            Answer::Accept => return Ok(true),
            Answer::Reject => return Ok(false),
            Answer::Request(next) => request = next,
        }
    }
}

pub async fn generate(settings: &Settings, args: &TargetArgs) -> Result<()> {
    let target = require_target(args)?;
    if target.exists() {
        return Err(Error::invalid_argument(format!(
            "{} already exists; use `previs fix`",
            target.display()
        )));
    }
    let provider = provider(settings, args)?;

    tokio::fs::write(target, STUB)
        .await
        .map_err(|e| previs_io::error::io_at(e, "generate::stub", target))?;

    let result = generate_into(args, target, provider).await;
    let accepted = matches!(result, Ok(true));
    if !accepted {
        if let Err(e) = tokio::fs::remove_file(target).await {
            tracing::warn!(error = %e, "failed to remove stub");
        }
    }
    match result {
        Ok(true) => {
            println!("created {}", target.display());
            Ok(())
        }
        Ok(false) => {
            println!("discarded");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn generate_into(args: &TargetArgs, target: &Path, provider: Arc<OpenAIProvider>) -> Result<bool> {
    let signal = interrupt_token();
    let request = match &args.request {
        Some(request) => request.clone(),
        None => ask("What should it be? > ", &signal).await?,
    };
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let agent = codegen(provider, llm_config(args, target));
    let options = RunOptions::new()
        .with_max_retries(args.max_retries)
        .with_signal(signal.clone());
    let input = CodeRequest::new(build_generate_prompt(&file_name, &request));
    let code = match until_cancelled(&signal, "cli::generate", run_agent(&agent, input, options)).await? {
        Ok(code) => code,
        Err(e) => return Err(run_failed(e)),
    };

    let staging = Staging::create(target, &code).await?;
    let decision = review_generated(args, &staging, &signal).await;
    settle(staging, decision).await
}

/// Test the staged result and ask whether to keep it
async fn review_generated(args: &TargetArgs, staging: &Staging, signal: &CancellationToken) -> Result<bool> {
    if let Some(cmd) = test_command(args)? {
        let report = until_cancelled(signal, "test::run", TestRunner::new().run_for(&cmd, staging.path())).await?;
        print_report(&cmd.display_for(staging.path()), &report);
    }
    if args.yes {
        return Ok(true);
    }
    Ok(parse_answer(&ask("Accept? [y/N] ", signal).await?) == Answer::Accept)
}

pub async fn serve(settings: &Settings, args: &TargetArgs) -> Result<()> {
    let config = settings.preview_config(args.port, preview_cwd(args.target.as_deref()));
    let mut server = PreviewServer::start(config)?;
    let signal = interrupt_token();
    if let Err(e) = wait_for_build(&mut server, &signal).await {
        if let Err(dispose) = server.dispose().await {
            tracing::warn!(error = %dispose, "failed to stop preview");
        }
        return Err(e);
    }
    println!("serving {} (Ctrl+C to stop)", server.url());

    signal.cancelled().await;
    server.dispose().await
}

pub async fn screenshot(settings: &Settings, args: &TargetArgs) -> Result<()> {
    let mut visual = Visual::start(settings, args, args.target.as_deref())?;
    let captured = visual.capture(&interrupt_token()).await;
    visual.dispose().await?;
    captured.map(|_| ())
}

pub async fn test(args: &TargetArgs) -> Result<()> {
    let target = require_target(args)?;
    let cmd = test_command(args)?
        .ok_or_else(|| Error::invalid_argument("no test command given after `--`"))?;

    let report = TestRunner::new().run_for(&cmd, target).await?;
    print_report(&cmd.display_for(target), &report);
    if report.passed() {
        Ok(())
    } else {
        Err(Error::process_failed(cmd.program(), "test failed")
            .with_context("exit", report.exit_code.to_string()))
    }
}

/// Absolute path of `program` on `PATH`
fn which(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

pub fn doctor(settings: &Settings) -> Result<()> {
    let check = |ok: bool| if ok { "ok" } else { "missing" };

    for program in ["git", settings.browser.as_str()] {
        match which(program) {
            Some(path) => println!("[{}] {}: {}", check(true), program, path.display()),
            None => println!("[{}] {}: not found on PATH", check(false), program),
        }
    }
    println!(
        "[{}] API key{}",
        check(settings.has_api_key()),
        match &settings.base_url {
            Some(url) => format!(" (endpoint {})", url),
            None => String::new(),
        }
    );
    Ok(())
}
