//! Core types shared by the reporter, the runner and the CLI

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where the current run reports to.
///
/// Written once by the setup phase and read by every worker. Field names on
/// disk are camelCase so the file stays readable by other tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    /// Thread receiving per-test notifications
    #[serde(default)]
    pub thread_id: String,

    /// Channel holding the header message
    #[serde(default)]
    pub channel_id: String,

    /// Header message edited throughout the run
    #[serde(default)]
    pub header_message_id: String,

    /// Top line reused on every header edit
    #[serde(default)]
    pub suite_label: String,
}

impl RunMetadata {
    /// Thread id if the setup phase has published one
    pub fn thread_destination(&self) -> Option<&str> {
        let id = self.thread_id.trim();
        (!id.is_empty()).then_some(id)
    }

    /// (channel, header message) pair if both are known
    pub fn header_destination(&self) -> Option<(&str, &str)> {
        let channel = self.channel_id.trim();
        let header = self.header_message_id.trim();
        if channel.is_empty() || header.is_empty() {
            None
        } else {
            Some((channel, header))
        }
    }
}

/// A pending thread post
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueuedMessage {
    pub content: String,
    pub file_path: Option<PathBuf>,
    pub extra_notice: Option<String>,
}

impl QueuedMessage {
    /// Plain text message
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Message with an attachment
    pub fn with_attachment(content: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            content: content.into(),
            file_path: Some(path.into()),
            extra_notice: None,
        }
    }

    /// Text actually posted when no attachment accompanies the message
    pub fn rendered_content(&self) -> String {
        match (&self.file_path, &self.extra_notice) {
            (None, Some(notice)) if !notice.trim().is_empty() => {
                format!("{}\n\n{}", self.content, notice)
            }
            _ => self.content.clone(),
        }
    }
}

/// Final outcome of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    Failed,
    TimedOut,
    Skipped,
}

impl TestOutcome {
    pub fn is_failure(self) -> bool {
        matches!(self, TestOutcome::Failed | TestOutcome::TimedOut)
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestOutcome::Passed => "passed",
            TestOutcome::Failed => "failed",
            TestOutcome::TimedOut => "timed_out",
            TestOutcome::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Running tallies for the header message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub total: u32,
    pub completed: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl ProgressCounters {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Count one final outcome. Timeouts count as failures.
    pub fn record(&mut self, outcome: TestOutcome) {
        self.completed = self.completed.saturating_add(1);
        match outcome {
            TestOutcome::Passed => self.passed = self.passed.saturating_add(1),
            TestOutcome::Skipped => self.skipped = self.skipped.saturating_add(1),
            TestOutcome::Failed | TestOutcome::TimedOut => {
                self.failed = self.failed.saturating_add(1)
            }
        }
    }
}

/// Test project a spec belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Project {
    /// Browser tests driven through Playwright
    #[default]
    E2e,
    /// GraphQL/HTTP tests
    Api,
}

impl Project {
    pub const ALL: [Project; 2] = [Project::E2e, Project::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            Project::E2e => "e2e",
            Project::Api => "api",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "e2e" => Some(Project::E2e),
            "api" => Some(Project::Api),
            _ => None,
        }
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
