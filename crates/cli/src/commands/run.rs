//! Run test specs with live reporting

use anyhow::{anyhow, Context};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use testrelay_common::config::parse_projects;
use testrelay_common::{Project, RelayConfig};
use testrelay_e2e::playwright::Browser;
use testrelay_e2e::{
    GraphqlClient, PlaywrightConfig, PlaywrightDriver, RunnerConfig, TestRunner, TestSpec,
    TestSuiteResult,
};
use testrelay_reporter::{MemoryChatClient, ReportContext, StaticDestination};
use tracing::info;

use crate::commands::setup;
use crate::output::{self, OutputFormat};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory containing YAML test specs
    #[arg(default_value = "tests/specs")]
    pub specs: PathBuf,

    /// Tag filter such as `smoke|regression` (overrides TAGS)
    #[arg(long)]
    pub tags: Option<String>,

    /// Runner grep expression, only used for the header label
    #[arg(long)]
    pub grep: Option<String>,

    /// Projects to run, comma separated (e2e, api)
    #[arg(long)]
    pub project: Option<String>,

    /// Concurrent tests
    #[arg(long, short = 'j')]
    pub threads: Option<usize>,

    /// Target environment (LOCAL, ORANGE, PROD)
    #[arg(long)]
    pub env: Option<String>,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    pub browser: String,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Per-test timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,

    /// Published report URL linked from the final summary
    #[arg(long)]
    pub report_url: Option<String>,

    /// Directory for test-results.json
    #[arg(long, default_value = "test-results")]
    pub output: PathBuf,

    /// Directory for failure screenshots
    #[arg(long, default_value = "screenshots")]
    pub screenshots: PathBuf,

    /// Reuse the header posted by an earlier `testrelay setup`
    #[arg(long)]
    pub skip_setup: bool,

    /// Log chat calls instead of sending them
    #[arg(long)]
    pub dry_run: bool,
}

/// Apply command-line flags on top of file and environment configuration
pub fn apply_overrides(config: &mut RelayConfig, args: &RunArgs) -> anyhow::Result<()> {
    if let Some(tags) = &args.tags {
        config.run.tags = Some(tags.trim().to_string()).filter(|t| !t.is_empty());
    }
    if let Some(project) = &args.project {
        config.run.projects = parse_projects(project)?;
    }
    if let Some(threads) = args.threads {
        config.run.threads = threads;
    }
    if let Some(env) = &args.env {
        config.run.test_env = env.trim().to_ascii_uppercase();
    }
    if let Some(url) = &args.report_url {
        config.run.report_url = Some(url.clone());
    }
    config.validate()?;
    Ok(())
}

/// Whether any runnable spec of `project` is selected
fn needs(config: &RelayConfig, specs: &[TestSpec], project: Project) -> bool {
    config.run.selected_projects().contains(&project)
        && specs.iter().any(|s| s.project == project && !s.skip)
}

async fn report_context(config: &RelayConfig, args: &RunArgs) -> anyhow::Result<ReportContext> {
    let header = setup::run_header(config, args.grep.as_deref());

    if args.dry_run {
        let client = Arc::new(MemoryChatClient::echoing());
        let meta = setup::dry_run_header(client.as_ref(), &header).await?;
        return Ok(ReportContext::new(
            client,
            Arc::new(StaticDestination::new(Some(meta))),
            config.flush.clone(),
            config.discord.log_passed,
        ));
    }

    if !args.skip_setup {
        setup::post_header(config, &header).await?;
    }
    Ok(ReportContext::from_config(config)?)
}

fn print_summary(suite: &TestSuiteResult) {
    println!();
    println!(
        "{} {}  {} {}  {} {}  ({} ms)",
        suite.passed.to_string().green().bold(),
        "passed".green(),
        suite.failed.to_string().red().bold(),
        "failed".red(),
        suite.skipped.to_string().dimmed(),
        "skipped".dimmed(),
        suite.duration_ms
    );
    for result in suite.results.iter().filter(|r| r.outcome.is_failure()) {
        println!(
            "  {} {} [{}]",
            "✗".red(),
            result.name,
            output::outcome_label(result.outcome)
        );
    }
    if suite.undelivered_notifications > 0 {
        output::print_warning(&format!(
            "{} notification(s) were not delivered",
            suite.undelivered_notifications
        ));
    }
}

pub async fn execute(
    args: RunArgs,
    mut config: RelayConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    apply_overrides(&mut config, &args)?;

    let browser = Browser::parse(&args.browser)
        .ok_or_else(|| anyhow!("Unknown browser \"{}\"", args.browser))?;

    let specs = TestSpec::load_all(&args.specs)
        .with_context(|| format!("loading specs from {}", args.specs.display()))?;
    info!("Loaded {} spec(s) from {}", specs.len(), args.specs.display());

    // Resolve targets before anything is posted
    let driver = if needs(&config, &specs, Project::E2e) {
        Some(PlaywrightDriver::new(PlaywrightConfig {
            base_url: config.run.base_url()?,
            screenshot_dir: args.screenshots.clone(),
            browser,
            headless: !args.headed,
        })?)
    } else {
        None
    };
    let graphql = if needs(&config, &specs, Project::Api) {
        Some(GraphqlClient::from_base(
            &config.run.api_base_url()?,
            &config.run.graphql_path,
        )?)
    } else {
        None
    };

    if !args.skip_setup {
        setup::clean(Path::new("."))?;
    }
    let ctx = report_context(&config, &args).await?;

    let runner_config = RunnerConfig {
        output_dir: args.output.clone(),
        screenshot_dir: args.screenshots.clone(),
        test_timeout: Duration::from_secs(args.timeout),
        ..RunnerConfig::from_run_config(&config.run, &args.specs)
    };
    let mut runner = TestRunner::new(runner_config, Arc::new(ctx));
    if let Some(driver) = driver {
        runner = runner.with_browser(Arc::new(driver));
    }
    if let Some(graphql) = graphql {
        runner = runner.with_graphql(graphql);
    }

    let suite = runner.run_specs(specs).await?;
    runner.write_results(&suite)?;

    if format != OutputFormat::Table {
        output::print_list(&suite.results, format);
    } else {
        print_summary(&suite);
    }

    if !suite.success() {
        std::process::exit(1);
    }
    Ok(())
}
