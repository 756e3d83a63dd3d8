//! Run setup
//!
//! Executed once before any worker starts: clear stale artifacts, post the
//! header, open the run thread and publish the metadata workers read.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use testrelay_common::{RunMetadata, RunMetadataStore};
use tracing::{debug, info};

use crate::client::ChatClient;
use crate::error::ReportResult;

/// Directories emptied at the start of every run
pub const ARTIFACT_DIRS: [&str; 3] = ["screenshots", ".playwright-report", "test-results"];

/// Label used when no tag filter is active
pub const ALL_TESTS_LABEL: &str = "all";

/// `/pattern/flags` as written on the command line
static GREP_DELIMITERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(.*)/[a-z]*$").expect("static regex"));

/// Human label for a tag filter: `/(smoke|samples)/i` becomes `smoke, samples`
pub fn prettify_grep(raw: Option<&str>) -> String {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return ALL_TESTS_LABEL.to_string();
    }

    let body = GREP_DELIMITERS
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    let cleaned = body.replace("(?:", "").replace(['(', ')'], "");
    let parts: Vec<&str> = cleaned
        .split('|')
        .map(|p| p.trim().trim_start_matches('@'))
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        ALL_TESTS_LABEL.to_string()
    } else {
        parts.join(", ")
    }
}

/// Label for the active filter, preferring `tags` over the runner's grep
pub fn grep_label(tags: Option<&str>, grep: Option<&str>) -> String {
    let tags = tags.map(str::trim).filter(|t| !t.is_empty());
    prettify_grep(tags.or(grep))
}

/// `{suite}: {env} | {label}`
pub fn suite_title(suite_name: &str, env: &str, grep_label: &str) -> String {
    format!("{}: {} | {}", suite_name, env, grep_label)
}

/// `{suite} Run Logs`
pub fn thread_name(suite_name: &str) -> String {
    format!("{} Run Logs", suite_name)
}

/// Remove artifact directories below `root`, returning the ones that existed
pub fn clean_artifacts(root: &Path) -> ReportResult<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for dir in ARTIFACT_DIRS {
        let path = root.join(dir);
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
            debug!("Removed {}", path.display());
            removed.push(path);
        }
    }
    Ok(removed)
}

/// Header details for a new run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHeader {
    pub suite_name: String,
    pub env: String,
    pub grep_label: String,
}

impl RunHeader {
    pub fn title(&self) -> String {
        suite_title(&self.suite_name, &self.env, &self.grep_label)
    }
}

/// Post the header, open the thread and persist the run metadata
pub async fn start_run(
    client: &dyn ChatClient,
    store: &RunMetadataStore,
    channel_id: &str,
    header: &RunHeader,
) -> ReportResult<RunMetadata> {
    let title = header.title();
    let handle = client
        .create_header(channel_id, &title, &thread_name(&header.suite_name))
        .await?;

    let meta = RunMetadata {
        thread_id: handle.thread_id,
        channel_id: channel_id.to_string(),
        header_message_id: handle.header_id,
        suite_label: title,
    };
    store.save(&meta)?;

    info!(
        thread_id = %meta.thread_id,
        header_id = %meta.header_message_id,
        "Run header posted"
    );
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ChatCall, MemoryChatClient};

    #[test]
    fn test_prettify_grep() {
        assert_eq!(prettify_grep(Some("/(smoke|samples)/i")), "smoke, samples");
        assert_eq!(prettify_grep(Some("samples")), "samples");
        assert_eq!(prettify_grep(Some("(?:@smoke|@api)")), "smoke, api");
        assert_eq!(prettify_grep(Some("  ")), "all");
        assert_eq!(prettify_grep(None), "all");
    }

    #[test]
    fn test_grep_label_prefers_tags() {
        assert_eq!(grep_label(Some("smoke"), Some("/regression/")), "smoke");
        assert_eq!(grep_label(Some(""), Some("/regression/")), "regression");
    }

    #[test]
    fn test_titles() {
        assert_eq!(suite_title("Suite", "LOCAL", "all"), "Suite: LOCAL | all");
        assert_eq!(thread_name("Suite"), "Suite Run Logs");
    }

    #[test]
    fn test_clean_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("screenshots/nested")).unwrap();
        std::fs::create_dir_all(dir.path().join("test-results")).unwrap();
        std::fs::create_dir_all(dir.path().join("keep")).unwrap();

        let removed = clean_artifacts(dir.path()).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!dir.path().join("screenshots").exists());
        assert!(dir.path().join("keep").exists());
    }

    #[tokio::test]
    async fn test_start_run_persists_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunMetadataStore::new(dir.path().join(".discord-run.json"));
        let client = MemoryChatClient::new();
        let header = RunHeader {
            suite_name: "Suite".to_string(),
            env: "ORANGE".to_string(),
            grep_label: "smoke".to_string(),
        };

        let meta = start_run(&client, &store, "chan", &header).await.unwrap();

        assert_eq!(meta.suite_label, "Suite: ORANGE | smoke");
        assert_eq!(store.load().await, Some(meta.clone()));
        assert_eq!(
            client.calls()[0],
            ChatCall::CreateHeader {
                channel_id: "chan".to_string(),
                title: "Suite: ORANGE | smoke".to_string(),
                thread_name: "Suite Run Logs".to_string(),
            }
        );
    }
}
