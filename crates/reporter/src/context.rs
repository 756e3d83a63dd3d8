//! Per-run reporting context
//!
//! Built once by the orchestrator and shared with every test. Holds the
//! notification queue, the header tracker and the failure bookkeeping. With
//! chat disabled the context holds neither and every call is a no-op.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use testrelay_common::snippet::{first_non_blank_line, strip_ansi, truncate_snippet, THREAD_SNIPPET_LIMIT};
use testrelay_common::{
    extract_snippet, FlushConfig, QueuedMessage, RelayConfig, RunMetadataStore, TestOutcome,
};
use tracing::{error, info};

use crate::client::ChatClient;
use crate::destination::RunDestination;
use crate::discord::DiscordClient;
use crate::error::{ReportResult, TestAbort};
use crate::header::HeaderProgressTracker;
use crate::queue::{DrainReport, NotificationQueue};

/// Shown when a failed UI test left no screenshot
pub const NO_SCREENSHOT_NOTICE: &str = "Unable to capture screenshot for this failure.";

/// Reason used when nothing better is known
pub const GENERIC_FAILURE_REASON: &str = "Test failed.";

/// Everything known about a failed UI test when its teardown runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub title: String,
    pub outcome: TestOutcome,
    pub raw_error: Option<String>,
    /// Configured test timeout, quoted for timed-out tests
    pub timeout: Option<Duration>,
    pub screenshot: Option<PathBuf>,
}

#[derive(Default)]
struct Bookkeeping {
    /// First `mark_failed` reason per title, consumed by the failure report
    reasons: HashMap<String, String>,
    /// Titles whose failure message is already queued
    notified: HashSet<String>,
}

/// Reporting state for one run
pub struct ReportContext {
    queue: Option<NotificationQueue>,
    tracker: Option<HeaderProgressTracker>,
    log_passed: bool,
    book: Mutex<Bookkeeping>,
}

impl std::fmt::Debug for ReportContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportContext")
            .field("enabled", &self.is_enabled())
            .field("log_passed", &self.log_passed)
            .finish()
    }
}

impl ReportContext {
    /// Context reporting through `client`
    pub fn new(
        client: Arc<dyn ChatClient>,
        destination: Arc<dyn RunDestination>,
        flush: FlushConfig,
        log_passed: bool,
    ) -> Self {
        Self {
            queue: Some(NotificationQueue::new(
                Arc::clone(&client),
                Arc::clone(&destination),
                flush,
            )),
            tracker: Some(HeaderProgressTracker::new(client, destination)),
            log_passed,
            book: Mutex::new(Bookkeeping::default()),
        }
    }

    /// Context that reports nothing
    pub fn disabled() -> Self {
        Self {
            queue: None,
            tracker: None,
            log_passed: false,
            book: Mutex::new(Bookkeeping::default()),
        }
    }

    /// Build from configuration, reading the destination from the run
    /// metadata file. Missing credentials yield a disabled context.
    pub fn from_config(config: &RelayConfig) -> ReportResult<Self> {
        let Some((token, _channel)) = config.discord.credentials() else {
            info!("Discord reporting disabled (DISCORD_BOT_TOKEN/DISCORD_CHANNEL_ID not set)");
            return Ok(Self::disabled());
        };

        let client = DiscordClient::new(&config.discord.api_base, token)?;
        let store = RunMetadataStore::new(&config.run.run_meta_path);
        Ok(Self::new(
            Arc::new(client),
            Arc::new(store),
            config.flush.clone(),
            config.discord.log_passed,
        ))
    }

    pub fn is_enabled(&self) -> bool {
        self.queue.is_some()
    }

    pub fn queue(&self) -> Option<&NotificationQueue> {
        self.queue.as_ref()
    }

    pub fn tracker(&self) -> Option<&HeaderProgressTracker> {
        self.tracker.as_ref()
    }

    /// Scope for the test called `title`
    pub fn test(&self, title: impl Into<String>) -> TestScope<'_> {
        TestScope {
            ctx: self,
            title: title.into(),
        }
    }

    /// Start header progress for `total` tests
    pub async fn begin_run(&self, total: u32) {
        if let Some(tracker) = &self.tracker {
            tracker.begin(total).await;
        }
    }

    /// Count a finished test in the header
    pub async fn record_outcome(&self, outcome: TestOutcome) {
        if let Some(tracker) = &self.tracker {
            tracker.record(outcome).await;
        }
    }

    fn enqueue(&self, message: QueuedMessage) {
        if let Some(queue) = &self.queue {
            queue.enqueue(message);
        }
    }

    /// Claim the failure slot for `title`; false if already reported
    fn claim_failure(&self, title: &str) -> bool {
        self.book.lock().notified.insert(title.trim().to_string())
    }

    /// Take the reason `mark_failed` recorded for `title`
    fn take_reason(&self, title: &str) -> Option<String> {
        self.book.lock().reasons.remove(title.trim())
    }

    /// Queue the failure message for a finished UI test
    pub fn report_failure(&self, report: FailureReport) {
        let recorded = self.take_reason(&report.title);
        if !self.is_enabled() || !self.claim_failure(&report.title) {
            return;
        }

        let reason = recorded
            .or_else(|| match (report.outcome, report.timeout) {
                (TestOutcome::TimedOut, Some(timeout)) => {
                    Some(format!("Test timed-out after {}s.", timeout.as_secs()))
                }
                _ => None,
            })
            .or_else(|| {
                report.raw_error.as_deref().and_then(|raw| {
                    first_non_blank_line(&strip_ansi(raw)).map(str::to_string)
                })
            })
            .unwrap_or_else(|| GENERIC_FAILURE_REASON.to_string());

        let content = failure_message(
            report.title.trim(),
            &truncate_snippet(&reason, THREAD_SNIPPET_LIMIT),
        );
        let message = match report.screenshot {
            Some(path) => QueuedMessage::with_attachment(content, path),
            None => QueuedMessage {
                content,
                file_path: None,
                extra_notice: Some(NO_SCREENSHOT_NOTICE.to_string()),
            },
        };
        self.enqueue(message);
    }

    /// Queue the condensed failure for an API test, led by the recorded
    /// `mark_failed` reason when there is one
    pub fn report_api_failure<S: AsRef<str>>(&self, title: &str, errors: &[S]) {
        let recorded = self.take_reason(title);
        if !self.is_enabled() || !self.claim_failure(title) {
            return;
        }
        self.enqueue(QueuedMessage::text(api_failure_message(
            title.trim(),
            recorded.as_deref(),
            errors,
        )));
    }

    /// Deliver queued messages without finalizing the header
    pub async fn drain(&self) -> DrainReport {
        match &self.queue {
            Some(queue) => queue.drain().await,
            None => DrainReport::default(),
        }
    }

    /// Drain notifications, then write the final header summary
    pub async fn shutdown(&self, report_url: Option<&str>) -> DrainReport {
        let report = self.drain().await;
        if let Some(tracker) = &self.tracker {
            tracker.finalize(report_url).await;
        }
        report
    }
}

/// Handle used by one test to mark its own result
pub struct TestScope<'a> {
    ctx: &'a ReportContext,
    title: String,
}

impl TestScope<'_> {
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Post a pass notice when passed logging is on
    pub fn mark_passed(&self, reason: Option<&str>) {
        let title = self.title.trim();
        if title.is_empty() || !self.ctx.log_passed {
            return;
        }
        let content = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!("✅ {}\nReason: {}", title, reason),
            None => format!("✅ {}", title),
        };
        self.ctx.enqueue(QueuedMessage::text(content));
    }

    /// Record why this test failed and return the value that stops it.
    ///
    /// Only the first reason per title is kept; the message itself is queued
    /// by [`ReportContext::report_failure`] when the test is torn down.
    pub fn mark_failed(&self, reason: &str) -> TestAbort {
        let title = self.title.trim();
        if title.is_empty() {
            error!("mark_failed() called without a current test");
            return TestAbort::NoActiveTest;
        }
        let reason = reason.trim();
        if reason.is_empty() {
            error!("mark_failed(\"{}\") called with an empty reason", title);
            return TestAbort::EmptyReason {
                title: title.to_string(),
            };
        }

        self.ctx
            .book
            .lock()
            .reasons
            .entry(title.to_string())
            .or_insert_with(|| reason.to_string());

        TestAbort::Failed {
            title: title.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// `❌ {title}\nReason: {reason}`
pub fn failure_message(title: &str, reason: &str) -> String {
    format!("❌ {}\nReason: {}", title, reason)
}

/// Thread message for a failed API test: title, optional reason line and
/// a fenced snippet
pub fn api_failure_message<S: AsRef<str>>(
    title: &str,
    reason: Option<&str>,
    errors: &[S],
) -> String {
    let mut message = format!("❌ **{}**", title);
    if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
        message.push_str("\nReason: ");
        message.push_str(&truncate_snippet(reason, THREAD_SNIPPET_LIMIT));
    }
    let snippet = truncate_snippet(extract_snippet(errors).trim(), THREAD_SNIPPET_LIMIT);
    if !snippet.is_empty() {
        message.push_str("\n```\n");
        message.push_str(&snippet);
        message.push_str("\n```");
    }
    message
}
