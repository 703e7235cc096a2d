//! Language-model completion adapter. One trait, one HTTP implementation
//! against any OpenAI-compatible chat completions endpoint (Groq in
//! production).

mod groq;

pub use groq::GroqClient;

use async_trait::async_trait;
use newsdesk_common::AdapterError;

/// A single completion request. Callers own prompt text and sampling
/// parameters; the adapter owns transport and error classification.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        CompletionRequest {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 500,
            temperature: 0.7,
        }
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AdapterError>;
}
