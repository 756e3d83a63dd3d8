//! In-memory chat client
//!
//! Records every call instead of talking to a platform. Backs `--dry-run`
//! and the test suites.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

use crate::client::{ChatClient, HeaderEdit, HeaderHandle, ThreadPost};
use crate::error::{ReportError, ReportResult};

/// One recorded client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    CreateHeader {
        channel_id: String,
        title: String,
        thread_name: String,
    },
    Edit {
        channel_id: String,
        message_id: String,
        edit: HeaderEdit,
    },
    Post {
        thread_id: String,
        post: ThreadPost,
    },
}

/// Chat client that keeps calls in memory
#[derive(Debug, Default)]
pub struct MemoryChatClient {
    calls: Mutex<Vec<ChatCall>>,
    fail_posts: AtomicBool,
    post_delay_ms: AtomicU64,
    next_id: AtomicU64,
    echo: bool,
}

impl MemoryChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log every call at info level
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Make subsequent thread posts fail
    pub fn set_fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }

    /// Hold each thread post for `delay` before it lands
    pub fn set_post_delay(&self, delay: Duration) {
        self.post_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().clone()
    }

    /// Thread posts in the order they arrived
    pub fn posts(&self) -> Vec<ThreadPost> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ChatCall::Post { post, .. } => Some(post.clone()),
                _ => None,
            })
            .collect()
    }

    /// Header edits in the order they arrived
    pub fn edits(&self) -> Vec<HeaderEdit> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ChatCall::Edit { edit, .. } => Some(edit.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ChatCall) {
        if self.echo {
            match &call {
                ChatCall::CreateHeader { title, .. } => info!("[dry-run] header: {}", title),
                ChatCall::Edit { edit, .. } => info!("[dry-run] header edit:\n{}", edit.content),
                ChatCall::Post { post, .. } => {
                    let attached = post
                        .attachment
                        .as_ref()
                        .map(|a| format!(" [+{}]", a.filename))
                        .unwrap_or_default();
                    info!("[dry-run] thread post{}:\n{}", attached, post.content)
                }
            }
        }
        self.calls.lock().push(call);
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ChatClient for MemoryChatClient {
    async fn create_header(
        &self,
        channel_id: &str,
        title: &str,
        thread_name: &str,
    ) -> ReportResult<HeaderHandle> {
        self.record(ChatCall::CreateHeader {
            channel_id: channel_id.to_string(),
            title: title.to_string(),
            thread_name: thread_name.to_string(),
        });
        Ok(HeaderHandle {
            header_id: self.next_id("header"),
            thread_id: self.next_id("thread"),
        })
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        edit: &HeaderEdit,
    ) -> ReportResult<()> {
        self.record(ChatCall::Edit {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            edit: edit.clone(),
        });
        Ok(())
    }

    async fn post_to_thread(&self, thread_id: &str, post: &ThreadPost) -> ReportResult<()> {
        let delay = self.post_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(ReportError::Status {
                endpoint: "POST /channels/{thread}/messages".to_string(),
                status: 500,
                body: "simulated failure".to_string(),
            });
        }
        self.record(ChatCall::Post {
            thread_id: thread_id.to_string(),
            post: post.clone(),
        });
        Ok(())
    }
}
