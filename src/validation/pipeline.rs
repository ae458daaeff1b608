//! Security validation pipeline
//!
//! ```text
//! session ─► location config ─► network ─► geofence ─► device ─► day state ─► anomaly
//! (CRIT)        (CRIT)           (HIGH)     (HIGH)      (HIGH)     (INFO)      (warn only)
//! ```
//!
//! Runs in fixed order and stops at the first hard rejection. Passing or
//! failing is decided by violations alone; the security score is only
//! reported.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::config::ValidationSettings;
use crate::store::{AttendanceStore, StoreError};
use super::anomaly::{AnomalyScorer, BehaviorHistory, EVENT_LOOKBACK_HOURS, HISTORY_RECORDS};
use super::device::DeviceIdentityMatcher;
use super::geofence::{GeoError, GeofenceValidator};
use super::network::NetworkIdentityValidator;
use super::state::{AttendanceStateTracker, Proposal};
use super::types::{
    AttendanceEvidence, ProceedData, ScoreCard, ValidationResult, ViolationCode, WarningCode,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid evidence: {0}")]
    InvalidInput(#[from] GeoError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SecurityValidationPipeline {
    store: Arc<dyn AttendanceStore>,
    audit: AuditLog,
    settings: ValidationSettings,
    offset: FixedOffset,
    network: NetworkIdentityValidator,
    geofence: GeofenceValidator,
    device: DeviceIdentityMatcher,
    state: AttendanceStateTracker,
    anomaly: AnomalyScorer,
}

impl SecurityValidationPipeline {
    pub fn new(store: Arc<dyn AttendanceStore>, settings: ValidationSettings, offset: FixedOffset) -> Self {
        Self {
            audit: AuditLog::new(store.clone()),
            store,
            geofence: GeofenceValidator::new(settings.near_boundary_ratio),
            anomaly: AnomalyScorer::new(offset),
            settings,
            offset,
            network: NetworkIdentityValidator,
            device: DeviceIdentityMatcher,
            state: AttendanceStateTracker,
        }
    }

    /// School-local calendar date
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    pub async fn validate(
        &self,
        session_user: Uuid,
        evidence: &AttendanceEvidence,
        now: DateTime<Utc>,
    ) -> Result<ValidationResult, PipelineError> {
        let user_id = evidence.user_id;
        let mut score = ScoreCard::default();
        let mut warnings = BTreeSet::new();

        // 0. Boundary: evidence must be for the signed-in user
        if user_id != session_user {
            self.audit.security_event(
                session_user,
                ViolationCode::SessionUserMismatch,
                json!({ "claimed_user_id": user_id }),
                now,
            );
            return Ok(ValidationResult::rejected(
                ViolationCode::SessionUserMismatch,
                "Submitted user does not match the signed-in user",
                warnings,
                score,
            ));
        }

        // 1. Active location config, fail-closed
        let Some(config) = self.store.active_location().await? else {
            tracing::error!("No active location config, rejecting attendance for {}", user_id);
            return Ok(ValidationResult::rejected(
                ViolationCode::LocationConfigMissing,
                "Attendance location is not configured",
                warnings,
                score,
            ));
        };

        let skew_ms = now.timestamp_millis().saturating_sub(evidence.timestamp_millis).unsigned_abs();
        let allowed_ms = self.settings.clock_skew_secs.saturating_mul(1000).unsigned_abs();
        if skew_ms > allowed_ms {
            warnings.insert(WarningCode::ClockSkew);
            score.deduct(WarningCode::ClockSkew.penalty());
        }

        // 2. Network
        let network = self.network.validate(
            evidence.wifi_ssid.as_deref(),
            evidence.ip_address.as_deref(),
            evidence.connection_type.as_deref(),
            &config,
        );
        if !network.ok {
            let reason = network.reason.unwrap_or_else(|| "Network not allowed".to_string());
            self.audit.security_event(
                user_id,
                ViolationCode::NetworkMismatch,
                json!({ "reason": reason, "signature": network.signature }),
                now,
            );
            return Ok(ValidationResult::rejected(ViolationCode::NetworkMismatch, reason, warnings, score));
        }

        // 3. Geofence
        let geo = self.geofence.is_within(evidence.latitude, evidence.longitude, &config)?;
        if !geo.ok {
            self.audit.security_event(
                user_id,
                ViolationCode::OutsideGeofence,
                json!({ "distance_meters": geo.distance_meters, "radius_meters": config.radius_meters }),
                now,
            );
            return Ok(ValidationResult::rejected(
                ViolationCode::OutsideGeofence,
                format!(
                    "You are {:.0} m from the school; the limit is {:.0} m",
                    geo.distance_meters, config.radius_meters
                ),
                warnings,
                score,
            ));
        }
        if geo.near_boundary {
            warnings.insert(WarningCode::NearBoundary);
            score.deduct(WarningCode::NearBoundary.penalty());
        }

        // 4. Device
        let Some(enrolled) = self.store.enrolled_biometric(user_id).await? else {
            return Ok(ValidationResult::rejected(
                ViolationCode::NoBiometricEnrolled,
                "No biometric enrollment found for this account",
                warnings,
                score,
            ));
        };
        if !self.device.matches(&evidence.fingerprint_hash, &enrolled.reference_fingerprint_hash) {
            self.audit.security_event(
                user_id,
                ViolationCode::FingerprintMismatch,
                json!({ "distance_meters": geo.distance_meters }),
                now,
            );
            return Ok(ValidationResult::rejected(
                ViolationCode::FingerprintMismatch,
                "This device does not match the registered device",
                warnings,
                score,
            ));
        }

        // 5. Day state
        let date = self.local_date(now);
        let today = self.store.record_for_day(user_id, date).await?;
        let attendance_type = match self.state.propose(today.as_ref()) {
            Proposal::Next(t) => t,
            Proposal::AlreadyCompleted => {
                tracing::info!("Attendance for {} on {} already complete", user_id, date);
                return Ok(ValidationResult::rejected(
                    ViolationCode::AlreadyCompleted,
                    "Check-in and check-out are already recorded for today",
                    warnings,
                    score,
                ));
            }
        };

        // 6. Anomaly, never fatal
        let history = self.load_history(user_id, now).await;
        let report = self.anomaly.score(&history, attendance_type, network.signature.as_deref(), now);
        if report.score > self.settings.anomaly_threshold {
            let signals: Vec<&str> = report.signals.iter().map(|s| s.description()).collect();
            tracing::warn!(
                user_id = %user_id,
                anomaly_score = report.score,
                signals = %signals.join("; "),
                "Suspicious attendance pattern"
            );
            warnings.insert(WarningCode::SuspiciousPattern);
            score.deduct(WarningCode::SuspiciousPattern.penalty());
        }

        tracing::info!(
            "Validation passed for {}: {} at {:.1} m, score {}",
            user_id,
            attendance_type.as_str(),
            geo.distance_meters,
            score.value()
        );

        Ok(ValidationResult::proceed(
            ProceedData {
                attendance_type,
                date,
                distance_meters: geo.distance_meters,
                anomaly_score: report.score,
                network_signature: network.signature,
                proceed_token: None,
            },
            warnings,
            score,
        ))
    }

    async fn load_history(&self, user_id: Uuid, now: DateTime<Utc>) -> BehaviorHistory {
        let records = match self.store.recent_records(user_id, HISTORY_RECORDS).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Anomaly history unavailable for {}: {}", user_id, e);
                Vec::new()
            }
        };
        let since = now - Duration::hours(EVENT_LOOKBACK_HOURS);
        let events = match self.store.security_events_since(user_id, since).await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Security event history unavailable for {}: {}", user_id, e);
                Vec::new()
            }
        };
        BehaviorHistory { records, events }
    }
}
