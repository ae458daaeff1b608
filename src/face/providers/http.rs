//! Generic JSON face-match service
//!
//! For self-hosted models. The service receives the captured image and the
//! reference URL and answers in the common result shape.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::face::types::{CapturedPhoto, FaceProvider, FaceVerificationResult, ProviderError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    captured_image: &'a str,
    reference_url: &'a str,
}

pub struct HttpModelProvider {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpModelProvider {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, api_key: Option<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        }
    }
}

#[async_trait]
impl FaceProvider for HttpModelProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        !self.endpoint.is_empty()
    }

    async fn execute(
        &self,
        captured: &CapturedPhoto,
        reference_url: &str,
        timeout: Duration,
    ) -> Result<FaceVerificationResult, ProviderError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&VerifyRequest {
                captured_image: captured.base64(),
                reference_url,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(ProviderError::Api(format!("HTTP {}: {}", status, snippet)));
        }

        Ok(response.json::<FaceVerificationResult>().await?)
    }
}
