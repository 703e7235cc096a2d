//! Image generation and hosting adapters. Generation talks to a
//! Pollinations-style GET endpoint; hosting uploads finished bytes to a
//! catbox-style multipart endpoint and returns the public URL.

mod host;
mod pollinations;

pub use host::CatboxClient;
pub use pollinations::{PollinationsClient, MODEL_FALLBACK};

use async_trait::async_trait;
use newsdesk_common::AdapterError;

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Render `prompt` at the given dimensions with a named model. Returns
    /// raw image bytes.
    async fn generate(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
        model: &str,
    ) -> Result<Vec<u8>, AdapterError>;
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload image bytes, returning the hosted URL.
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<String, AdapterError>;
}
