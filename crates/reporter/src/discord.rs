//! Discord REST client
//!
//! Thin wrapper over the bot API: post + thread creation for the run header,
//! message edits for progress, thread posts for notifications. Nothing here
//! retries; the queue decides what to do with a failed call.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use testrelay_common::snippet::truncate_snippet;
use tracing::{debug, warn};

use crate::client::{ChatClient, HeaderEdit, HeaderHandle, ThreadPost};
use crate::error::{ReportError, ReportResult};

/// Public API base
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Discord rejects longer message bodies
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Discord rejects longer thread names
pub const MAX_THREAD_NAME_CHARS: usize = 100;

/// Threads auto-archive after a day of inactivity
const THREAD_AUTO_ARCHIVE_MINUTES: u32 = 1440;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Keep error bodies short in logs
const ERROR_BODY_LIMIT: usize = 200;

/// Discord bot client
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl DiscordClient {
    /// Create a client against `api_base` (usually [`DEFAULT_API_BASE`])
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> ReportResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ReportError::Transport {
                endpoint: "client".to_string(),
                detail: e.to_string(),
            })?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bot {}", self.token))
    }

    /// Send a request and decode the JSON body (Null for empty bodies)
    async fn send(&self, endpoint: &str, request: RequestBuilder) -> ReportResult<Value> {
        debug!("Discord request: {}", endpoint);

        let response = request.send().await.map_err(|e| ReportError::Transport {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ReportError::Transport {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })?;

        if !status.is_success() {
            warn!("Discord {} returned {}", endpoint, status);
            return Err(ReportError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: truncate_snippet(body.trim(), ERROR_BODY_LIMIT),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| ReportError::Transport {
            endpoint: endpoint.to_string(),
            detail: format!("invalid JSON response: {}", e),
        })
    }

    /// Post a plain message to a channel and return its id
    pub async fn post_message(&self, channel_id: &str, content: &str) -> ReportResult<String> {
        let endpoint = "POST /channels/{id}/messages";
        let body = json!({ "content": truncate_snippet(content, MAX_MESSAGE_CHARS) });
        let value = self
            .send(
                endpoint,
                self.request(Method::POST, &format!("/channels/{}/messages", channel_id))
                    .json(&body),
            )
            .await?;

        response_id(&value).ok_or_else(|| ReportError::MissingField {
            endpoint: endpoint.to_string(),
            field: "id",
        })
    }

    /// Start a thread from an existing message and return the thread id
    pub async fn start_thread(
        &self,
        channel_id: &str,
        message_id: &str,
        name: &str,
    ) -> ReportResult<String> {
        let endpoint = "POST /channels/{id}/messages/{id}/threads";
        let body = json!({
            "name": truncate_snippet(name, MAX_THREAD_NAME_CHARS),
            "auto_archive_duration": THREAD_AUTO_ARCHIVE_MINUTES,
        });
        let value = self
            .send(
                endpoint,
                self.request(
                    Method::POST,
                    &format!("/channels/{}/messages/{}/threads", channel_id, message_id),
                )
                .json(&body),
            )
            .await?;

        response_id(&value).ok_or_else(|| ReportError::MissingField {
            endpoint: endpoint.to_string(),
            field: "id",
        })
    }
}

fn response_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn edit_body(edit: &HeaderEdit) -> Value {
    let mut body = json!({ "content": truncate_snippet(&edit.content, MAX_MESSAGE_CHARS) });
    if let Some(embeds) = &edit.embeds {
        body["embeds"] = Value::Array(
            embeds
                .iter()
                .map(|description| json!({ "description": description }))
                .collect(),
        );
    }
    body
}

#[async_trait]
impl ChatClient for DiscordClient {
    async fn create_header(
        &self,
        channel_id: &str,
        title: &str,
        thread_name: &str,
    ) -> ReportResult<HeaderHandle> {
        let header_id = self.post_message(channel_id, title).await?;
        let thread_id = self.start_thread(channel_id, &header_id, thread_name).await?;
        Ok(HeaderHandle {
            header_id,
            thread_id,
        })
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        edit: &HeaderEdit,
    ) -> ReportResult<()> {
        self.send(
            "PATCH /channels/{id}/messages/{id}",
            self.request(
                Method::PATCH,
                &format!("/channels/{}/messages/{}", channel_id, message_id),
            )
            .json(&edit_body(edit)),
        )
        .await?;
        Ok(())
    }

    async fn post_to_thread(&self, thread_id: &str, post: &ThreadPost) -> ReportResult<()> {
        let path = format!("/channels/{}/messages", thread_id);
        let payload = json!({ "content": truncate_snippet(&post.content, MAX_MESSAGE_CHARS) });

        let request = match &post.attachment {
            Some(attachment) => {
                let part = Part::bytes(attachment.data.clone())
                    .file_name(attachment.filename.clone());
                let form = Form::new()
                    .text("payload_json", payload.to_string())
                    .part("files[0]", part);
                self.request(Method::POST, &path).multipart(form)
            }
            None => self.request(Method::POST, &path).json(&payload),
        };

        self.send("POST /channels/{thread}/messages", request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Attachment;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> DiscordClient {
        DiscordClient::new(server.base_url(), "secret").unwrap()
    }

    #[tokio::test]
    async fn test_create_header_posts_then_opens_thread() {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/channels/c1/messages")
                .header("authorization", "Bot secret")
                .json_body(json!({ "content": "Suite: LOCAL | all" }));
            then.status(200).json_body(json!({ "id": "m1" }));
        });
        let thread = server.mock(|when, then| {
            when.method(POST)
                .path("/channels/c1/messages/m1/threads")
                .json_body(json!({ "name": "Suite Run Logs", "auto_archive_duration": 1440 }));
            then.status(201).json_body(json!({ "id": "t1" }));
        });

        let handle = client(&server)
            .create_header("c1", "Suite: LOCAL | all", "Suite Run Logs")
            .await
            .unwrap();

        post.assert_calls(1);
        thread.assert_calls(1);
        assert_eq!(
            handle,
            HeaderHandle {
                header_id: "m1".to_string(),
                thread_id: "t1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_id_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/channels/c1/messages");
            then.status(200).json_body(json!({}));
        });

        let err = client(&server).post_message("c1", "hi").await.unwrap_err();
        assert!(matches!(err, ReportError::MissingField { field: "id", .. }));
    }

    #[tokio::test]
    async fn test_edit_without_embeds_sends_content_only() {
        let server = MockServer::start();
        let edit = server.mock(|when, then| {
            when.method(PATCH)
                .path("/channels/c1/messages/m1")
                .json_body(json!({ "content": "progress" }));
            then.status(200).json_body(json!({ "id": "m1" }));
        });

        client(&server)
            .edit_message("c1", "m1", &HeaderEdit::content("progress"))
            .await
            .unwrap();
        edit.assert_calls(1);
    }

    #[tokio::test]
    async fn test_edit_with_embeds() {
        let server = MockServer::start();
        let edit = server.mock(|when, then| {
            when.method(PATCH).path("/channels/c1/messages/m1").json_body(json!({
                "content": "done",
                "embeds": [{ "description": "link" }]
            }));
            then.status(200).json_body(json!({ "id": "m1" }));
        });

        let request = HeaderEdit {
            content: "done".to_string(),
            embeds: Some(vec!["link".to_string()]),
        };
        client(&server)
            .edit_message("c1", "m1", &request)
            .await
            .unwrap();
        edit.assert_calls(1);
    }

    #[tokio::test]
    async fn test_thread_post_text() {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/channels/t1/messages")
                .json_body(json!({ "content": "❌ login\nReason: bad" }));
            then.status(200).json_body(json!({ "id": "x" }));
        });

        client(&server)
            .post_to_thread("t1", &ThreadPost::text("❌ login\nReason: bad"))
            .await
            .unwrap();
        post.assert_calls(1);
    }

    #[tokio::test]
    async fn test_thread_post_with_attachment_is_multipart() {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/channels/t1/messages")
                .body_includes("payload_json")
                .body_includes("shot.png");
            then.status(200).json_body(json!({ "id": "x" }));
        });

        let message = ThreadPost {
            content: "❌ login".to_string(),
            attachment: Some(Attachment {
                filename: "shot.png".to_string(),
                data: vec![1, 2, 3],
            }),
        };
        client(&server).post_to_thread("t1", &message).await.unwrap();
        post.assert_calls(1);
    }

    #[tokio::test]
    async fn test_error_status_carries_truncated_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/channels/t1/messages");
            then.status(429).body("x".repeat(500));
        });

        let err = client(&server)
            .post_to_thread("t1", &ThreadPost::text("hi"))
            .await
            .unwrap_err();
        match err {
            ReportError::Status { status, body, .. } => {
                assert_eq!(status, 429);
                assert!(body.chars().count() <= ERROR_BODY_LIMIT);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = DiscordClient::new(DEFAULT_API_BASE, "secret").unwrap();
        assert!(!format!("{:?}", client).contains("secret"));
    }
}
