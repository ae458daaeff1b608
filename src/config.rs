//! Configuration module

use std::env;
use std::time::Duration;

use serde::Deserialize;

const DEV_JWT_SECRET: &str = "attendance-guard-dev-secret-change-in-production";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL (None = in-memory store)
    pub database_url: Option<String>,

    /// Server port
    pub port: u16,

    /// JWT secret key (session tokens and proceed tokens)
    pub jwt_secret: String,

    /// Lifetime of the proceed token issued after a passed validation
    pub proceed_token_ttl_secs: i64,

    /// Environment (development, production)
    pub environment: String,

    /// Emit logs as JSON
    pub log_json: bool,

    /// School-local UTC offset used to decide "today"
    pub utc_offset_hours: i32,

    /// Reverse proxies in front of the server that append to X-Forwarded-For.
    /// 0 means the TCP peer address is the client.
    pub trusted_proxy_hops: usize,

    /// Validation tuning
    pub validation: ValidationSettings,

    /// Face provider chain
    pub face: FaceSettings,
}

/// Pipeline thresholds
#[derive(Debug, Clone)]
pub struct ValidationSettings {
    /// Fraction of the radius past which a near-boundary warning is raised
    pub near_boundary_ratio: f64,

    /// Anomaly score above which SUSPICIOUS_PATTERN is raised
    pub anomaly_threshold: u8,

    /// Allowed difference between client and server clocks
    pub clock_skew_secs: i64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            near_boundary_ratio: 0.8,
            anomaly_threshold: 70,
            clock_skew_secs: 300,
        }
    }
}

/// Face verification tuning
#[derive(Debug, Clone)]
pub struct FaceSettings {
    pub min_match_score: f64,
    pub min_confidence: f64,
    pub provider_timeout: Duration,
    pub race_providers: bool,
    pub race_budget: Duration,
    pub providers: Vec<ProviderConfig>,
}

impl Default for FaceSettings {
    fn default() -> Self {
        Self {
            min_match_score: 0.70,
            min_confidence: 0.70,
            provider_timeout: Duration::from_secs(10),
            race_providers: false,
            race_budget: Duration::from_secs(15),
            providers: Vec::new(),
        }
    }
}

/// One entry of `FACE_PROVIDERS`, in priority order
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// "facepp" or "http"
    pub kind: String,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Overrides FACE_PROVIDER_TIMEOUT_SECS for this provider
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let validation = ValidationSettings {
            near_boundary_ratio: parse_env("NEAR_BOUNDARY_RATIO", 0.8),
            anomaly_threshold: parse_env("ANOMALY_THRESHOLD", 70),
            clock_skew_secs: parse_env("CLOCK_SKEW_SECS", 300),
        };

        let providers = match env::var("FACE_PROVIDERS") {
            Ok(raw) => serde_json::from_str::<Vec<ProviderConfig>>(&raw).unwrap_or_else(|e| {
                tracing::error!("FACE_PROVIDERS is not valid JSON, no providers loaded: {}", e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };

        let face = FaceSettings {
            min_match_score: parse_env("FACE_MIN_MATCH_SCORE", 0.70),
            min_confidence: parse_env("FACE_MIN_CONFIDENCE", 0.70),
            provider_timeout: Duration::from_secs(parse_env("FACE_PROVIDER_TIMEOUT_SECS", 10)),
            race_providers: parse_env("FACE_RACE_PROVIDERS", false),
            race_budget: Duration::from_secs(parse_env("FACE_RACE_BUDGET_SECS", 15)),
            providers,
        };

        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()),

            port: parse_env("PORT", 8080),

            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| DEV_JWT_SECRET.to_string()),

            proceed_token_ttl_secs: parse_env("PROCEED_TOKEN_TTL_SECS", 300),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),

            log_json: env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false),

            utc_offset_hours: parse_env("UTC_OFFSET_HOURS", 7),

            trusted_proxy_hops: parse_env("TRUSTED_PROXY_HOPS", 0),

            validation,
            face,
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Production must not run on the built-in development secret
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    /// Config suitable for tests and local runs
    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            port: 0,
            jwt_secret: "test-secret".to_string(),
            proceed_token_ttl_secs: 300,
            environment: "test".to_string(),
            log_json: false,
            utc_offset_hours: 7,
            trusted_proxy_hops: 0,
            validation: ValidationSettings::default(),
            face: FaceSettings::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config_parsing() {
        let raw = r#"[
            {"name": "facepp", "kind": "facepp", "endpoint": "https://api-us.faceplusplus.com/facepp/v3/compare", "api_key": "k", "api_secret": "s"},
            {"name": "local", "kind": "http", "endpoint": "http://127.0.0.1:9000/verify", "timeout_secs": 5}
        ]"#;

        let providers: Vec<ProviderConfig> = serde_json::from_str(raw).unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].api_secret.as_deref(), Some("s"));
        assert_eq!(providers[1].timeout_secs, Some(5));
        assert!(providers[1].api_key.is_none());
    }

    #[test]
    fn test_default_thresholds() {
        let config = Config::for_tests();
        assert_eq!(config.validation.near_boundary_ratio, 0.8);
        assert_eq!(config.validation.anomaly_threshold, 70);
        assert_eq!(config.face.min_match_score, 0.70);
        assert!(!config.is_production());
    }
}
