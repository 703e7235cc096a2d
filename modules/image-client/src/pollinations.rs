use std::time::Duration;

use async_trait::async_trait;
use newsdesk_common::AdapterError;
use rand::Rng;
use tracing::debug;
use url::Url;

use crate::ImageGenerator;

/// Models tried in order when generation fails; the upstream hosts several
/// backends of differing reliability.
pub const MODEL_FALLBACK: [&str; 3] = ["turbo", "flux", "seedream"];

/// The upstream serves HTML error pages with a 200 status; anything smaller
/// than this is not a real image.
const MIN_IMAGE_BYTES: usize = 1024;

pub struct PollinationsClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PollinationsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        PollinationsClient {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    fn build_url(&self, prompt: &str, width: u32, height: u32, model: &str) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AdapterError::Permanent(format!("bad image base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| AdapterError::Permanent("image base url cannot take a path".to_string()))?
            .push("prompt")
            .push(prompt);
        let seed: u32 = rand::rng().random();
        url.query_pairs_mut()
            .append_pair("width", &width.to_string())
            .append_pair("height", &height.to_string())
            .append_pair("model", model)
            .append_pair("nologo", "true")
            .append_pair("seed", &seed.to_string());
        Ok(url)
    }
}

#[async_trait]
impl ImageGenerator for PollinationsClient {
    async fn generate(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
        model: &str,
    ) -> Result<Vec<u8>, AdapterError> {
        let url = self.build_url(prompt, width, height, model)?;

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
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
                "image endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(AdapterError::Permanent(format!(
                "image endpoint returned {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(AdapterError::from_request)?
            .to_vec();
        if bytes.len() < MIN_IMAGE_BYTES {
            return Err(AdapterError::Transient(format!(
                "image body only {} bytes, treating as error page",
                bytes.len()
            )));
        }

        debug!(model, width, height, bytes = bytes.len(), "image generated");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_encodes_prompt_and_parameters() {
        let client =
            PollinationsClient::new("https://img.example.com", Duration::from_secs(60));
        let url = client
            .build_url("a red fox, watercolor", 1280, 720, "flux")
            .unwrap();
        assert!(url.path().starts_with("/prompt/"));
        assert!(url.path().contains("a%20red%20fox"));
        let query = url.query().unwrap();
        assert!(query.contains("width=1280"));
        assert!(query.contains("height=720"));
        assert!(query.contains("model=flux"));
        assert!(query.contains("nologo=true"));
        assert!(query.contains("seed="));
    }

    #[test]
    fn fallback_chain_is_ordered() {
        assert_eq!(MODEL_FALLBACK, ["turbo", "flux", "seedream"]);
    }
}
