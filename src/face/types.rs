//! Face verification types

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Upper bound on a decoded captured photo
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceVerificationResult {
    /// The provider produced a verdict (not whether it matched)
    pub success: bool,
    pub face_detected: bool,
    /// 0.0 - 1.0
    pub match_score: f64,
    pub is_live: bool,
    pub is_fake: bool,
    /// 0.0 - 1.0
    pub confidence: f64,
    #[serde(default)]
    pub provider_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl FaceVerificationResult {
    /// Provider ran but could not produce a verdict
    pub fn failed(provider_name: &str, reasoning: impl Into<String>) -> Self {
        Self {
            success: false,
            face_detected: false,
            match_score: 0.0,
            is_live: false,
            is_fake: false,
            confidence: 0.0,
            provider_name: provider_name.to_string(),
            reasoning: Some(reasoning.into()),
        }
    }

    /// Clamp scores into [0, 1]; providers are not trusted to do it
    pub fn normalized(mut self) -> Self {
        self.match_score = clamp_unit(self.match_score);
        self.confidence = clamp_unit(self.confidence);
        self
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhotoError {
    #[error("photo is empty")]
    Empty,

    #[error("photo is not valid base64")]
    InvalidEncoding,

    #[error("photo exceeds {MAX_PHOTO_BYTES} bytes")]
    TooLarge,
}

/// A captured photo as submitted by the client, base64 encoded
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    base64: String,
    sha256: String,
}

impl CapturedPhoto {
    /// Accepts raw base64 or a `data:image/...;base64,` URL
    pub fn from_base64(input: &str) -> Result<Self, PhotoError> {
        let trimmed = input.trim();
        let payload = match trimmed.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => trimmed,
        };
        if payload.is_empty() {
            return Err(PhotoError::Empty);
        }

        let bytes = STANDARD.decode(payload).map_err(|_| PhotoError::InvalidEncoding)?;
        if bytes.is_empty() {
            return Err(PhotoError::Empty);
        }
        if bytes.len() > MAX_PHOTO_BYTES {
            return Err(PhotoError::TooLarge);
        }

        let mut hasher = Sha256::new();
        hasher.update(&bytes);

        Ok(Self {
            base64: payload.to_string(),
            sha256: hex::encode(hasher.finalize()),
        })
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider is not configured")]
    NotConfigured,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("http error: {0}")]
    Http(String),

    #[error("provider returned an error: {0}")]
    Api(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Http(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

/// One face-match backend. Implementations must not branch on other
/// providers; ordering and fallback belong to the chain.
#[async_trait]
pub trait FaceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap, local check (credentials present, not disabled)
    fn available(&self) -> bool;

    async fn execute(
        &self,
        captured: &CapturedPhoto,
        reference_url: &str,
        timeout: Duration,
    ) -> Result<FaceVerificationResult, ProviderError>;
}
