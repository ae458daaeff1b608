//! Shared validation types: evidence, codes, result

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Ephemeral per-attempt input. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEvidence {
    pub user_id: Uuid,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[serde(default, alias = "wifiSSID")]
    pub wifi_ssid: Option<String>,
    /// Server-observed client address; never read from the request body
    #[serde(default, skip_deserializing)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub connection_type: Option<String>,
    #[validate(length(min = 1, max = 512))]
    pub fingerprint_hash: String,
    pub timestamp_millis: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Hard-rejection codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
    SessionUserMismatch,
    LocationConfigMissing,
    NetworkMismatch,
    OutsideGeofence,
    NoBiometricEnrolled,
    FingerprintMismatch,
    AlreadyCompleted,
}

impl ViolationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionUserMismatch => "SESSION_USER_MISMATCH",
            Self::LocationConfigMissing => "LOCATION_CONFIG_MISSING",
            Self::NetworkMismatch => "NETWORK_MISMATCH",
            Self::OutsideGeofence => "OUTSIDE_GEOFENCE",
            Self::NoBiometricEnrolled => "NO_BIOMETRIC_ENROLLED",
            Self::FingerprintMismatch => "FINGERPRINT_MISMATCH",
            Self::AlreadyCompleted => "ALREADY_COMPLETED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::SessionUserMismatch | Self::LocationConfigMissing => Severity::Critical,
            Self::NetworkMismatch | Self::OutsideGeofence | Self::FingerprintMismatch => Severity::High,
            Self::NoBiometricEnrolled => Severity::Medium,
            Self::AlreadyCompleted => Severity::Info,
        }
    }

    /// Points taken off the security score
    pub fn penalty(&self) -> u8 {
        match self {
            Self::SessionUserMismatch | Self::LocationConfigMissing => 100,
            Self::NetworkMismatch | Self::OutsideGeofence => 40,
            Self::FingerprintMismatch => 30,
            Self::NoBiometricEnrolled => 20,
            Self::AlreadyCompleted => 0,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Self::SessionUserMismatch => Action::SignInAgain,
            Self::LocationConfigMissing => Action::ContactAdmin,
            Self::NetworkMismatch | Self::OutsideGeofence | Self::FingerprintMismatch => Action::Retry,
            Self::NoBiometricEnrolled => Action::EnrollBiometric,
            Self::AlreadyCompleted => Action::AlreadyDone,
        }
    }

    pub fn remedy(&self) -> &'static str {
        match self {
            Self::SessionUserMismatch => "Sign in again with your own account",
            Self::LocationConfigMissing => "Ask an administrator to configure the attendance location",
            Self::NetworkMismatch => "Connect to the school WiFi and try again",
            Self::OutsideGeofence => "Move inside the school area and try again",
            Self::NoBiometricEnrolled => "Complete biometric enrollment first",
            Self::FingerprintMismatch => "Use your registered device, or ask an administrator to reset your enrollment",
            Self::AlreadyCompleted => "Nothing to do, attendance for today is complete",
        }
    }
}

/// Non-rejecting findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    NearBoundary,
    SuspiciousPattern,
    ClockSkew,
}

impl WarningCode {
    pub fn penalty(&self) -> u8 {
        match self {
            Self::NearBoundary => 10,
            Self::SuspiciousPattern => 20,
            Self::ClockSkew => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    ProceedPhoto,
    Retry,
    EnrollBiometric,
    ContactAdmin,
    SignInAgain,
    AlreadyDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceType {
    CheckIn,
    CheckOut,
}

impl AttendanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckIn => "check-in",
            Self::CheckOut => "check-out",
        }
    }
}

/// Security score. Starts at 100 and only ever goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreCard(u8);

impl Default for ScoreCard {
    fn default() -> Self {
        Self(100)
    }
}

impl ScoreCard {
    pub fn deduct(&mut self, points: u8) {
        self.0 = self.0.saturating_sub(points);
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Payload of a passed validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProceedData {
    pub attendance_type: AttendanceType,
    pub date: NaiveDate,
    pub distance_meters: f64,
    pub anomaly_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_signature: Option<String>,
    /// Filled in by the service once the result is final
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proceed_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub success: bool,
    pub violations: BTreeSet<ViolationCode>,
    pub warnings: BTreeSet<WarningCode>,
    pub security_score: u8,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remedy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ProceedData>,
}

impl ValidationResult {
    pub fn rejected(
        code: ViolationCode,
        reason: impl Into<String>,
        warnings: BTreeSet<WarningCode>,
        mut score: ScoreCard,
    ) -> Self {
        score.deduct(code.penalty());
        Self {
            success: false,
            violations: BTreeSet::from([code]),
            warnings,
            security_score: score.value(),
            action: code.action(),
            severity: Some(code.severity()),
            reason: Some(reason.into()),
            remedy: Some(code.remedy().to_string()),
            data: None,
        }
    }

    pub fn proceed(data: ProceedData, warnings: BTreeSet<WarningCode>, score: ScoreCard) -> Self {
        Self {
            success: true,
            violations: BTreeSet::new(),
            warnings,
            security_score: score.value(),
            action: Action::ProceedPhoto,
            severity: None,
            reason: None,
            remedy: None,
            data: Some(data),
        }
    }

    pub fn attendance_type(&self) -> Option<AttendanceType> {
        self.data.as_ref().map(|d| d.attendance_type)
    }
}
