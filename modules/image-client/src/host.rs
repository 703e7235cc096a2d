use std::time::Duration;

use async_trait::async_trait;
use newsdesk_common::AdapterError;
use reqwest::multipart;
use tracing::debug;

use crate::ImageHost;

/// Uploader for a catbox-style host: multipart POST, plain-text URL reply.
pub struct CatboxClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl CatboxClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        CatboxClient {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ImageHost for CatboxClient {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<String, AdapterError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("image/jpeg")
            .map_err(|e| AdapterError::Permanent(format!("bad upload part: {e}")))?;
        let form = multipart::Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", part);

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(AdapterError::from_request)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited { retry_after: None });
        }
        if status.is_server_error() {
            return Err(AdapterError::Transient(format!(
                "image host returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(AdapterError::Permanent(format!(
                "image host returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(AdapterError::from_request)?
            .trim()
            .to_string();
        if !body.starts_with("http") {
            return Err(AdapterError::Transient(format!(
                "image host reply was not a url: {body}"
            )));
        }

        debug!(url = %body, "image uploaded");
        Ok(body)
    }
}
