use std::time::Duration;

use async_trait::async_trait;
use newsdesk_common::AdapterError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{CompletionRequest, LanguageModel};

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions API.
pub struct GroqClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl GroqClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        GroqClient {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait]
impl LanguageModel for GroqClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AdapterError> {
        let payload = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(AdapterError::from_request)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AdapterError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(AdapterError::Transient(format!(
                "completion endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Permanent(format!(
                "completion endpoint returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Transient(format!("malformed completion body: {e}")))?;

        let content = extract_content(parsed)?;
        debug!(model = %self.model, chars = content.len(), "completion received");
        Ok(content)
    }
}

fn extract_content(response: ChatResponse) -> Result<String, AdapterError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AdapterError::Transient("completion had no content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(content: Option<&str>) -> ChatResponse {
        ChatResponse {
            choices: vec![ChatChoice {
                message: ChatChoiceMessage {
                    content: content.map(String::from),
                },
            }],
        }
    }

    #[test]
    fn extracts_and_trims_first_choice() {
        let out = extract_content(response_with(Some("  hello\n"))).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn empty_content_is_transient() {
        let err = extract_content(response_with(Some("   "))).unwrap_err();
        assert!(matches!(err, AdapterError::Transient(_)));
        let err = extract_content(response_with(None)).unwrap_err();
        assert!(matches!(err, AdapterError::Transient(_)));
    }

    #[test]
    fn no_choices_is_transient() {
        let err = extract_content(ChatResponse { choices: vec![] }).unwrap_err();
        assert!(matches!(err, AdapterError::Transient(_)));
    }
}
