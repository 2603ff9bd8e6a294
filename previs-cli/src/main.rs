//! # previs CLI
//!
//! Fix or generate UI components with an LLM, checked against a live preview
//! and an optional test command.
//!
//! Usage:
//!   previs <file>                      fix if the file exists, else generate
//!   previs fix <file> -- <test-cmd>    `__FILE__` in the test command is the staged file
//!   previs gen <file>
//!   previs serve | ss | test <file> -- <test-cmd> | doctor
//!
//! Examples:
//!   previs button.tsx --request "make it blue"
//!   previs fix sum.ts --auto -- npx vitest run __FILE__
//!   previs ss --width 400px --height 300px

mod commands;
mod config;

use clap::{Args, Parser, Subcommand};
use config::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "previs")]
#[command(author, version, about = "previs - preview driven component fixer")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    target: TargetArgs,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Component file
    pub target: Option<PathBuf>,

    /// Model name (default: PREVIS_MODEL or the provider default)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Send a screenshot of the preview to the model
    #[arg(long)]
    pub vision: bool,

    /// Retry until the test passes and accept without asking
    #[arg(long)]
    pub auto: bool,

    /// Request for the model (asked interactively when missing)
    #[arg(short, long)]
    pub request: Option<String>,

    /// Screenshot width, e.g. 400 or 400px
    #[arg(long)]
    pub width: Option<String>,

    /// Screenshot height, e.g. 300 or 300px
    #[arg(long)]
    pub height: Option<String>,

    /// Preview server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Accept generated code without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Retry budget of one agent run
    #[arg(long, default_value_t = previs_agent::DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Test command after `--`
    #[arg(last = true)]
    pub test_cmd: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fix an existing file
    Fix(TargetArgs),
    /// Generate a new file
    #[command(visible_aliases = ["gen", "g"])]
    Generate(TargetArgs),
    /// Start the preview server
    Serve(TargetArgs),
    /// Capture the preview
    #[command(visible_alias = "ss")]
    Screenshot(TargetArgs),
    /// Run the test command against a file
    Test(TargetArgs),
    /// Check the environment
    Doctor,
}

fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let fallback = format!(
        "previs_cli={l},previs_agent={l},previs_io={l},warn",
        l = level
    );
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let settings = Settings::from_env();

    let result = match cli.command {
        Some(Commands::Fix(args)) => commands::fix(&settings, &args).await,
        Some(Commands::Generate(args)) => commands::generate(&settings, &args).await,
        Some(Commands::Serve(args)) => commands::serve(&settings, &args).await,
        Some(Commands::Screenshot(args)) => commands::screenshot(&settings, &args).await,
        Some(Commands::Test(args)) => commands::test(&args).await,
        Some(Commands::Doctor) => commands::doctor(&settings),
        None => {
            if cli.target.target.is_none() {
                eprintln!("Error: No target file provided.");
                eprintln!("Usage: previs [OPTIONS] <TARGET> [-- <TEST_CMD>...]");
                eprintln!("       previs fix <TARGET> [-- <TEST_CMD>...]");
                eprintln!("       previs generate <TARGET>");
                eprintln!("       previs serve | screenshot | test <TARGET> | doctor");
                eprintln!("\nExamples:");
                eprintln!("  previs button.tsx --request \"make it blue\"");
                eprintln!("  previs fix sum.ts --auto -- npx vitest run __FILE__");
                eprintln!("  previs --help");
                std::process::exit(1);
            }
            commands::fix_or_generate(&settings, &cli.target).await
        }
    };

    if let Err(e) = result {
        tracing::debug!(error = ?e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
