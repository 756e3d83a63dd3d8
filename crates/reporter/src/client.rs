//! Chat platform seam
//!
//! The reporter only needs three operations from the chat platform. Setup
//! uses `create_header` once per run; workers use the other two repeatedly.

use async_trait::async_trait;

use crate::error::ReportResult;

/// Identifiers returned when a run header is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderHandle {
    pub header_id: String,
    pub thread_id: String,
}

/// In-place replacement of the header message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderEdit {
    pub content: String,
    /// `None` leaves existing embeds untouched, `Some(vec![])` clears them
    pub embeds: Option<Vec<String>>,
}

impl HeaderEdit {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            embeds: None,
        }
    }
}

/// File uploaded alongside a thread post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// One message posted into the run thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPost {
    pub content: String,
    pub attachment: Option<Attachment>,
}

impl ThreadPost {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachment: None,
        }
    }
}

/// Operations the reporter needs from a chat platform
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post the header into `channel_id` and open a thread under it
    async fn create_header(
        &self,
        channel_id: &str,
        title: &str,
        thread_name: &str,
    ) -> ReportResult<HeaderHandle>;

    /// Overwrite a message in place
    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        edit: &HeaderEdit,
    ) -> ReportResult<()>;

    /// Post a message, optionally with a file, into a thread
    async fn post_to_thread(&self, thread_id: &str, post: &ThreadPost) -> ReportResult<()>;
}
