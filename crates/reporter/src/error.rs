//! Error types for run reporting

use thiserror::Error;

/// Errors raised by chat clients and run setup.
///
/// Inside the notification path these are always caught and logged; they
/// only surface to callers of setup-time operations.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Chat request to {endpoint} failed: {detail}")]
    Transport { endpoint: String, detail: String },

    #[error("Chat API returned {status} for {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Chat response from {endpoint} is missing '{field}'")]
    MissingField { endpoint: String, field: &'static str },

    #[error("Chat reporting is not configured (set DISCORD_BOT_TOKEN and DISCORD_CHANNEL_ID)")]
    NotConfigured,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] testrelay_common::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// Value returned by `mark_failed` to stop the current test.
///
/// Step code returns it (`return Err(scope.mark_failed(..))`) and the runner
/// decides what to do. The misuse variants flag defects in test code rather
/// than test failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestAbort {
    #[error("[FAILED] {title}: {reason}")]
    Failed { title: String, reason: String },

    #[error("mark_failed() called without a current test title")]
    NoActiveTest,

    #[error("[CONFIG ERROR] mark_failed(\"{title}\") requires a non-empty reason")]
    EmptyReason { title: String },
}

impl TestAbort {
    /// True when the abort reports a bug in the test itself
    pub fn is_misuse(&self) -> bool {
        !matches!(self, TestAbort::Failed { .. })
    }

    /// Human reason for a regular failure
    pub fn reason(&self) -> Option<&str> {
        match self {
            TestAbort::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
