//! Face++ compare API
//!
//! Sends the captured photo as base64 and the enrolled photo by URL.
//! Face++ reports similarity on 0-100 with reference thresholds at fixed
//! false-accept rates; the 1e-4 threshold anchors our confidence.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::face::types::{CapturedPhoto, FaceProvider, FaceVerificationResult, ProviderError};

pub const DEFAULT_ENDPOINT: &str = "https://api-us.faceplusplus.com/facepp/v3/compare";

#[derive(Debug, Deserialize)]
struct CompareResponse {
    confidence: Option<f64>,
    #[serde(default)]
    thresholds: HashMap<String, f64>,
    #[serde(default)]
    faces1: Vec<serde_json::Value>,
    #[serde(default)]
    faces2: Vec<serde_json::Value>,
    error_message: Option<String>,
}

pub struct FacePlusPlusProvider {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    client: reqwest::Client,
}

impl FacePlusPlusProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: Option<String>,
        api_key: Option<String>,
        api_secret: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.filter(|e| !e.is_empty()).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: api_key.filter(|k| !k.is_empty()),
            api_secret: api_secret.filter(|s| !s.is_empty()),
            client,
        }
    }
}

/// Map a parsed compare response onto the common result shape
fn interpret(name: &str, body: CompareResponse) -> Result<FaceVerificationResult, ProviderError> {
    if let Some(msg) = body.error_message {
        return Err(ProviderError::Api(msg));
    }

    let face_detected = !body.faces1.is_empty();
    let Some(similarity) = body.confidence else {
        // No comparison happened: a face is missing on one side
        let reasoning = if face_detected && body.faces2.is_empty() {
            "no face found in the enrolled photo"
        } else {
            "no face found in the captured photo"
        };
        return Ok(FaceVerificationResult {
            success: true,
            face_detected,
            match_score: 0.0,
            is_live: false,
            is_fake: false,
            confidence: 0.0,
            provider_name: name.to_string(),
            reasoning: Some(reasoning.to_string()),
        });
    };

    let threshold = body.thresholds.get("1e-4").copied().unwrap_or(69.101);
    let confidence = if threshold > 0.0 { (similarity / threshold).min(1.0) } else { 0.0 };

    Ok(FaceVerificationResult {
        success: true,
        face_detected,
        match_score: similarity / 100.0,
        is_live: false,
        is_fake: false,
        confidence,
        provider_name: name.to_string(),
        reasoning: Some(format!(
            "similarity {:.1} vs 1e-4 threshold {:.1}; liveness not assessed",
            similarity, threshold
        )),
    })
}

#[async_trait]
impl FaceProvider for FacePlusPlusProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }

    async fn execute(
        &self,
        captured: &CapturedPhoto,
        reference_url: &str,
        timeout: Duration,
    ) -> Result<FaceVerificationResult, ProviderError> {
        let (Some(key), Some(secret)) = (&self.api_key, &self.api_secret) else {
            return Err(ProviderError::NotConfigured);
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .form(&[
                ("api_key", key.as_str()),
                ("api_secret", secret.as_str()),
                ("image_base64_1", captured.base64()),
                ("image_url2", reference_url),
            ])
            .send()
            .await?;

        let status = response.status();
        let body: CompareResponse = response.json().await?;
        if !status.is_success() && body.error_message.is_none() {
            return Err(ProviderError::Api(format!("HTTP {}", status)));
        }

        interpret(&self.name, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> CompareResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_interpret_match() {
        let body = parse(r#"{
            "confidence": 92.4,
            "thresholds": {"1e-3": 62.3, "1e-4": 69.1, "1e-5": 73.9},
            "faces1": [{"face_token": "a"}],
            "faces2": [{"face_token": "b"}]
        }"#);
        let result = interpret("facepp", body).unwrap();
        assert!(result.success);
        assert!(result.face_detected);
        assert!((result.match_score - 0.924).abs() < 1e-9);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_interpret_weak_match() {
        let body = parse(r#"{
            "confidence": 40.0,
            "thresholds": {"1e-4": 80.0},
            "faces1": [{}],
            "faces2": [{}]
        }"#);
        let result = interpret("facepp", body).unwrap();
        assert!((result.confidence - 0.5).abs() < 1e-9);
        assert!((result.match_score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_interpret_no_face() {
        let body = parse(r#"{"faces1": [], "faces2": [{}]}"#);
        let result = interpret("facepp", body).unwrap();
        assert!(result.success);
        assert!(!result.face_detected);
        assert_eq!(result.match_score, 0.0);
    }

    #[test]
    fn test_interpret_api_error() {
        let body = parse(r#"{"error_message": "CONCURRENCY_LIMIT_EXCEEDED"}"#);
        assert_eq!(
            interpret("facepp", body).unwrap_err(),
            ProviderError::Api("CONCURRENCY_LIMIT_EXCEEDED".to_string())
        );
    }

    #[test]
    fn test_unavailable_without_credentials() {
        let p = FacePlusPlusProvider::new("facepp", None, Some("k".to_string()), None, reqwest::Client::new());
        assert!(!p.available());
        let p = FacePlusPlusProvider::new("facepp", None, Some("k".to_string()), Some("s".to_string()), reqwest::Client::new());
        assert!(p.available());
    }
}
