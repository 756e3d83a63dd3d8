//! TestRelay CLI - Main Entry Point
//!
//! Prepares runs, executes test specs and reports progress and failures to
//! the configured chat channel.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use testrelay_cli::commands::{run, setup, snippet, status, summary};
use testrelay_cli::output;
use testrelay_common::{RelayConfig, DEFAULT_CONFIG_FILE};

/// TestRelay - end-to-end and API tests with live run reporting
#[derive(Parser)]
#[command(name = "testrelay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, short, default_value = DEFAULT_CONFIG_FILE, env = "TESTRELAY_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean artifacts, post the run header and open the run thread
    Setup(setup::SetupArgs),

    /// Run test specs
    Run(run::RunArgs),

    /// Show reporting configuration and the active run
    Status,

    /// Summarize a results file, optionally updating the run header
    Summary(summary::SummaryArgs),

    /// Condense raw error output into a failure snippet
    Snippet(snippet::SnippetArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let config = || RelayConfig::from_file_and_env(&cli.config);

    match cli.command {
        Commands::Setup(args) => setup::execute(args, &config()?).await?,
        Commands::Run(args) => run::execute(args, config()?, cli.format).await?,
        Commands::Status => status::execute(&config()?, &cli.config, cli.format).await?,
        Commands::Summary(args) => summary::execute(args, &config()?, cli.format).await?,
        Commands::Snippet(args) => snippet::execute(args)?,
        Commands::Version => {
            println!("TestRelay CLI v{}", testrelay_common::VERSION);
            println!("Playwright and GraphQL test runs with live Discord reporting");
        }
    }

    Ok(())
}
