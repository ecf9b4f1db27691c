//! Discord-compatible webhook sink.

use std::time::Duration;

use async_trait::async_trait;
use roster_watch::Message;
use serde::Serialize;

use super::DeliverySink;
use crate::error::{DeliveryError, DeliveryResult};

/// Discord rejects message content longer than this.
pub const MAX_CONTENT_CHARS: usize = 2000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
    username: &'a str,
}

/// Posts each message as `{ "content", "username" }` JSON.
#[derive(Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    username: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, username: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.into(),
            username: username.into(),
        }
    }

    async fn post(&self, content: &str) -> DeliveryResult<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&WebhookPayload {
                content,
                username: &self.username,
            })
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    async fn send(&self, message: &Message) -> DeliveryResult<()> {
        let content = message.content();
        for chunk in split_content(&content, MAX_CONTENT_CHARS) {
            self.post(&chunk).await?;
        }
        tracing::debug!("Webhook sent: {} chars", content.chars().count());
        Ok(())
    }
}

/// Split text into chunks of at most `limit` characters, preferring line breaks.
pub fn split_content(content: &str, limit: usize) -> Vec<String> {
    if content.chars().count() <= limit {
        return vec![content.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in content.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_empty() { line_len } else { line_len + 1 };

        if current_len + needed > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > limit {
            // A single line that can never fit: hard split it.
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
