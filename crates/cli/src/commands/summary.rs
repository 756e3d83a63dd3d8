//! Summaries of finished runs

use anyhow::{bail, Context};
use clap::Args;
use std::path::PathBuf;
use testrelay_common::progress::{render_final_summary, report_link};
use testrelay_common::{ProgressCounters, RelayConfig, RunMetadataStore};
use testrelay_e2e::TestSuiteResult;
use testrelay_reporter::{ChatClient, DiscordClient, HeaderEdit, ReportError};
use tracing::info;

use crate::output::{self, OutputFormat};

#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    /// Results file written by `testrelay run`
    #[arg(default_value = "test-results/test-results.json")]
    pub results: PathBuf,

    /// Replace the run header with the final summary
    #[arg(long)]
    pub post: bool,

    /// Published report URL (overrides REPORT_URL)
    #[arg(long)]
    pub report_url: Option<String>,
}

/// Header tallies rebuilt from a results file
pub fn counters(suite: &TestSuiteResult) -> ProgressCounters {
    let mut counters = ProgressCounters::new(suite.results.len() as u32);
    for result in &suite.results {
        counters.record(result.outcome);
    }
    counters
}

/// Final header edit for a finished run
pub fn final_edit(
    suite_label: &str,
    counters: &ProgressCounters,
    report_url: Option<&str>,
) -> HeaderEdit {
    HeaderEdit {
        content: render_final_summary(suite_label, counters),
        embeds: Some(report_url.map(report_link).into_iter().collect()),
    }
}

pub async fn execute(
    args: SummaryArgs,
    config: &RelayConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&args.results)
        .with_context(|| format!("reading {}", args.results.display()))?;
    let suite: TestSuiteResult = serde_json::from_str(&content)?;
    let counters = counters(&suite);

    output::print_list(&suite.results, format);

    let store = RunMetadataStore::new(&config.run.run_meta_path);
    let meta = store.load().await;
    let label = meta
        .as_ref()
        .map(|m| m.suite_label.clone())
        .unwrap_or_else(|| config.run.suite_name.clone());
    let report_url = args.report_url.as_deref().or(config.run.report_url.as_deref());
    let edit = final_edit(&label, &counters, report_url);

    if format == OutputFormat::Table {
        println!();
        println!("{}", edit.content);
    }

    if !args.post {
        return Ok(());
    }

    let Some((token, _)) = config.discord.credentials() else {
        return Err(ReportError::NotConfigured.into());
    };
    let meta = store.load_required()?;
    let Some((channel, header)) = meta.header_destination() else {
        bail!("run metadata has no header message to edit");
    };

    let client = DiscordClient::new(&config.discord.api_base, token)?;
    client.edit_message(channel, header, &edit).await?;
    info!(header_id = %header, "Final summary posted");
    output::print_success("Run header updated with the final summary");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testrelay_common::{Project, TestOutcome};
    use testrelay_e2e::TestResult;

    fn result(name: &str, outcome: TestOutcome) -> TestResult {
        TestResult {
            name: name.to_string(),
            project: Project::E2e,
            outcome,
            duration_ms: 10,
            steps: vec![],
            error: None,
            screenshot: None,
        }
    }

    fn suite() -> TestSuiteResult {
        TestSuiteResult {
            total: 4,
            passed: 1,
            failed: 2,
            skipped: 1,
            duration_ms: 40,
            undelivered_notifications: 0,
            results: vec![
                result("a", TestOutcome::Passed),
                result("b", TestOutcome::Failed),
                result("c", TestOutcome::TimedOut),
                result("d", TestOutcome::Skipped),
            ],
        }
    }

    #[test]
    fn test_counters_fold_timeouts_into_failures() {
        let counters = counters(&suite());
        assert_eq!(counters.total, 4);
        assert_eq!(counters.completed, 4);
        assert_eq!((counters.passed, counters.failed, counters.skipped), (1, 2, 1));
    }

    #[test]
    fn test_final_edit_clears_or_sets_link() {
        let counters = counters(&suite());
        let edit = final_edit("Suite", &counters, None);
        assert!(edit.content.starts_with("Suite\nTests completed ✅ 100% [4/4]"));
        assert_eq!(edit.embeds, Some(vec![]));

        let edit = final_edit("Suite", &counters, Some("https://r.example"));
        assert_eq!(edit.embeds.unwrap().len(), 1);
    }
}
