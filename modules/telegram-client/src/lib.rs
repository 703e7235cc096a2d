//! Telegram Bot API send client. Sends a photo with a Markdown caption when
//! imagery exists, a plain Markdown message otherwise. Command handling
//! (/start, /stop) is not this crate's concern; subscriptions are managed in
//! the store.

use std::time::Duration;

use async_trait::async_trait;
use newsdesk_common::AdapterError;
use serde::Deserialize;
use tracing::debug;

/// One broadcastable article, already rendered for messaging.
#[derive(Debug, Clone)]
pub struct MessagePayload {
    pub title: String,
    pub teaser: String,
    pub link: String,
    pub image_url: Option<String>,
}

impl MessagePayload {
    /// Markdown body shared by photo captions and plain messages.
    pub fn render(&self) -> String {
        format!(
            "\u{1F4F0} *{}*\n\n{}\n\n\u{1F517} [Read more]({})",
            self.title, self.teaser, self.link
        )
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, chat_id: i64, payload: &MessagePayload) -> Result<(), AdapterError>;
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    description: Option<String>,
    parameters: Option<ApiParameters>,
}

#[derive(Debug, Deserialize)]
struct ApiParameters {
    retry_after: Option<u64>,
}

pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl TelegramClient {
    pub fn new(bot_token: &str, timeout: Duration) -> Self {
        Self::with_base_url(format!("https://api.telegram.org/bot{bot_token}"), timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        TelegramClient {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    async fn call(&self, method: &str, form: &[(&str, String)]) -> Result<(), AdapterError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .timeout(self.timeout)
            .form(form)
            .send()
            .await
            .map_err(AdapterError::from_request)?;

        let status = response.status();
        let reply: ApiReply = response
            .json()
            .await
            .map_err(|e| AdapterError::Transient(format!("malformed bot api reply: {e}")))?;

        if reply.ok {
            return Ok(());
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = reply
                .parameters
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs);
            return Err(AdapterError::RateLimited { retry_after });
        }
        let description = reply.description.unwrap_or_else(|| status.to_string());
        if status.is_server_error() {
            Err(AdapterError::Transient(description))
        } else {
            Err(AdapterError::Permanent(description))
        }
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send(&self, chat_id: i64, payload: &MessagePayload) -> Result<(), AdapterError> {
        let text = payload.render();
        match &payload.image_url {
            Some(image_url) => {
                self.call(
                    "sendPhoto",
                    &[
                        ("chat_id", chat_id.to_string()),
                        ("photo", image_url.clone()),
                        ("caption", text),
                        ("parse_mode", "Markdown".to_string()),
                    ],
                )
                .await?
            }
            None => {
                self.call(
                    "sendMessage",
                    &[
                        ("chat_id", chat_id.to_string()),
                        ("text", text),
                        ("parse_mode", "Markdown".to_string()),
                    ],
                )
                .await?
            }
        }
        debug!(chat_id, "message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_markdown_with_title_teaser_and_link() {
        let payload = MessagePayload {
            title: "Fusion milestone".to_string(),
            teaser: "Net energy gain sustained for a full minute.".to_string(),
            link: "https://example.com/fusion".to_string(),
            image_url: None,
        };
        let text = payload.render();
        assert!(text.contains("*Fusion milestone*"));
        assert!(text.contains("Net energy gain"));
        assert!(text.contains("[Read more](https://example.com/fusion)"));
    }
}
