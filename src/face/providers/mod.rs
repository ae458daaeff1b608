//! Concrete face providers and the factory that builds the chain from config

mod facepp;
mod http;

pub use facepp::FacePlusPlusProvider;
pub use http::HttpModelProvider;

use std::sync::Arc;
use std::time::Duration;

use crate::config::FaceSettings;
use super::chain::{ChainMode, FaceVerificationChain};
use super::types::FaceProvider;

/// Build the chain in `FACE_PROVIDERS` order. Unknown kinds are skipped.
pub fn build_chain(settings: &FaceSettings) -> FaceVerificationChain {
    let mode = if settings.race_providers {
        ChainMode::Raced { budget: settings.race_budget }
    } else {
        ChainMode::Sequential
    };
    let client = reqwest::Client::new();
    let mut chain = FaceVerificationChain::new(mode);

    for cfg in &settings.providers {
        let provider: Arc<dyn FaceProvider> = match cfg.kind.as_str() {
            "facepp" => Arc::new(FacePlusPlusProvider::new(
                cfg.name.clone(),
                Some(cfg.endpoint.clone()),
                cfg.api_key.clone(),
                cfg.api_secret.clone(),
                client.clone(),
            )),
            "http" => Arc::new(HttpModelProvider::new(
                cfg.name.clone(),
                cfg.endpoint.clone(),
                cfg.api_key.clone(),
                client.clone(),
            )),
            other => {
                tracing::warn!("Unknown face provider kind '{}' for {}, skipping", other, cfg.name);
                continue;
            }
        };
        let timeout = cfg
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(settings.provider_timeout);
        chain = chain.with_provider(provider, timeout);
    }

    if chain.is_empty() {
        tracing::warn!("No face providers configured; face verification will always fail");
    } else {
        tracing::info!("Face provider chain: {:?}", chain.provider_names());
    }
    chain
}
