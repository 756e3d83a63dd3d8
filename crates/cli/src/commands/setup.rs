//! Run setup: clean artifacts, post the header and open the run thread

use clap::Args;
use std::path::{Path, PathBuf};
use testrelay_common::{RelayConfig, RunMetadata, RunMetadataStore};
use testrelay_reporter::setup::{clean_artifacts, grep_label, start_run, thread_name, RunHeader};
use testrelay_reporter::{ChatClient, DiscordClient, MemoryChatClient};
use tracing::info;

use crate::output;

/// Channel name used for dry runs
pub const DRY_RUN_CHANNEL: &str = "dry-run";

#[derive(Args, Debug, Clone)]
pub struct SetupArgs {
    /// Runner grep expression, used for the header label when TAGS is unset
    #[arg(long)]
    pub grep: Option<String>,

    /// Directory holding the artifact folders
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Keep screenshots and reports from previous runs
    #[arg(long)]
    pub keep_artifacts: bool,

    /// Log chat calls instead of sending them
    #[arg(long)]
    pub dry_run: bool,
}

/// Header for the configured suite
pub fn run_header(config: &RelayConfig, grep: Option<&str>) -> RunHeader {
    RunHeader {
        suite_name: config.run.suite_name.clone(),
        env: config.run.test_env.clone(),
        grep_label: grep_label(config.run.tags.as_deref(), grep),
    }
}

/// Remove artifacts left by the previous run
pub fn clean(root: &Path) -> anyhow::Result<()> {
    let removed = clean_artifacts(root)?;
    if !removed.is_empty() {
        info!("Removed {} artifact folder(s)", removed.len());
    }
    Ok(())
}

/// Post the header when chat is configured.
///
/// Without credentials any stale metadata is removed so workers never post
/// into a previous run's thread.
pub async fn post_header(
    config: &RelayConfig,
    header: &RunHeader,
) -> anyhow::Result<Option<RunMetadata>> {
    let store = RunMetadataStore::new(&config.run.run_meta_path);

    let Some((token, channel)) = config.discord.credentials() else {
        info!("Discord reporting disabled; skipping run header");
        store.clear()?;
        return Ok(None);
    };

    let client = DiscordClient::new(&config.discord.api_base, token)?;
    let meta = start_run(&client, &store, channel, header).await?;
    Ok(Some(meta))
}

/// Create the header through `client` without persisting metadata
pub async fn dry_run_header(
    client: &dyn ChatClient,
    header: &RunHeader,
) -> anyhow::Result<RunMetadata> {
    let title = header.title();
    let handle = client
        .create_header(DRY_RUN_CHANNEL, &title, &thread_name(&header.suite_name))
        .await?;

    Ok(RunMetadata {
        thread_id: handle.thread_id,
        channel_id: DRY_RUN_CHANNEL.to_string(),
        header_message_id: handle.header_id,
        suite_label: title,
    })
}

pub async fn execute(args: SetupArgs, config: &RelayConfig) -> anyhow::Result<()> {
    if !args.keep_artifacts {
        clean(&args.root)?;
    }

    let header = run_header(config, args.grep.as_deref());

    if args.dry_run {
        let client = MemoryChatClient::echoing();
        let meta = dry_run_header(&client, &header).await?;
        output::print_info(&format!("Dry run: header \"{}\" not sent", meta.suite_label));
        return Ok(());
    }

    match post_header(config, &header).await? {
        Some(meta) => output::print_success(&format!(
            "Run header posted for \"{}\" (thread {})",
            meta.suite_label, meta.thread_id
        )),
        None => output::print_info("Discord reporting disabled; artifacts cleaned"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testrelay_reporter::memory::ChatCall;

    #[test]
    fn test_run_header_uses_tags_first() {
        let mut config = RelayConfig::default();
        config.run.suite_name = "Storefront".to_string();
        config.run.tags = Some("smoke|regression".to_string());

        let header = run_header(&config, Some("/(samples)/i"));
        assert_eq!(header.title(), "Storefront: LOCAL | smoke, regression");

        config.run.tags = None;
        let header = run_header(&config, Some("/(samples)/i"));
        assert_eq!(header.grep_label, "samples");
    }

    #[tokio::test]
    async fn test_post_header_without_credentials_clears_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RelayConfig::default();
        config.run.run_meta_path = dir.path().join(".discord-run.json");
        std::fs::write(&config.run.run_meta_path, "{}").unwrap();

        let header = run_header(&config, None);
        assert!(post_header(&config, &header).await.unwrap().is_none());
        assert!(!config.run.run_meta_path.exists());
    }

    #[tokio::test]
    async fn test_dry_run_header_records_call() {
        let client = MemoryChatClient::new();
        let header = run_header(&RelayConfig::default(), None);

        let meta = dry_run_header(&client, &header).await.unwrap();
        assert_eq!(meta.channel_id, DRY_RUN_CHANNEL);
        assert_eq!(meta.suite_label, "End2End Test Suite: LOCAL | all");
        assert!(matches!(
            &client.calls()[0],
            ChatCall::CreateHeader { thread_name, .. } if thread_name == "End2End Test Suite Run Logs"
        ));
    }

    #[test]
    fn test_clean_removes_artifact_folders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("screenshots")).unwrap();
        std::fs::create_dir_all(dir.path().join("specs")).unwrap();

        clean(dir.path()).unwrap();
        assert!(!dir.path().join("screenshots").exists());
        assert!(dir.path().join("specs").exists());
    }
}
