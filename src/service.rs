//! Attendance service
//!
//! The two inbound operations:
//! - `validate_security`: run the pipeline and, on success, issue a proceed token
//! - `verify_face`: check the token, match the face against the enrolled
//!   photo and commit the attendance record

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::audit::AuditLog;
use crate::config::Config;
use crate::face::{
    CapturedPhoto, FaceAcceptance, FaceChainError, FaceVerificationChain, PhotoError, ProviderAttempt,
};
use crate::models::{AttendanceRecord, NewCheckIn, NewFaceVerificationLog};
use crate::store::{AttendanceStore, CommitOutcome, StoreError};
use crate::token::ProceedTokens;
use crate::validation::{
    AttendanceEvidence, AttendanceStateTracker, AttendanceType, DayState, PipelineError, Proposal,
    SecurityValidationPipeline, ValidationResult, ViolationCode,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid photo: {0}")]
    Photo(#[from] PhotoError),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyFaceRequest {
    pub user_id: Uuid,
    /// Base64 or data URL
    #[validate(length(min = 1))]
    pub photo: String,
    #[validate(length(min = 1))]
    pub proceed_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaceCode {
    SessionUserMismatch,
    InvalidProceedToken,
    NoBiometricEnrolled,
    AllProvidersFailed,
    FaceNotMatched,
    AlreadyRecorded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_type: Option<AttendanceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<AttendanceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub attempts: Vec<ProviderAttempt>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceVerificationResponse {
    pub success: bool,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<FaceCode>,
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<FaceResponseData>,
}

impl FaceVerificationResponse {
    fn rejected(code: FaceCode, reasons: Vec<String>, data: Option<FaceResponseData>) -> Self {
        Self { success: false, verified: false, code: Some(code), reasons, data }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayStatus {
    pub date: NaiveDate,
    pub state: &'static str,
    pub record: Option<AttendanceRecord>,
}

pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
    pipeline: SecurityValidationPipeline,
    chain: FaceVerificationChain,
    acceptance: FaceAcceptance,
    tokens: ProceedTokens,
    audit: AuditLog,
}

impl AttendanceService {
    pub fn new(store: Arc<dyn AttendanceStore>, chain: FaceVerificationChain, config: &Config) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).unwrap_or_else(|| {
            tracing::warn!("UTC_OFFSET_HOURS={} is out of range, using UTC", config.utc_offset_hours);
            Utc.fix()
        });
        Self {
            pipeline: SecurityValidationPipeline::new(store.clone(), config.validation.clone(), offset),
            audit: AuditLog::new(store.clone()),
            acceptance: FaceAcceptance::from(&config.face),
            tokens: ProceedTokens::new(&config.jwt_secret, config.proceed_token_ttl_secs),
            store,
            chain,
        }
    }

    pub fn store(&self) -> &Arc<dyn AttendanceStore> {
        &self.store
    }

    pub async fn validate_security(
        &self,
        session_user: Uuid,
        evidence: &AttendanceEvidence,
        now: DateTime<Utc>,
    ) -> Result<ValidationResult, ServiceError> {
        let mut result = self.pipeline.validate(session_user, evidence, now).await?;

        if result.success {
            let score = result.security_score;
            if let Some(data) = result.data.as_mut() {
                data.proceed_token = Some(self.tokens.issue(evidence.user_id, data, score, now)?);
            }
        }
        Ok(result)
    }

    pub async fn verify_face(
        &self,
        session_user: Uuid,
        req: &VerifyFaceRequest,
        now: DateTime<Utc>,
    ) -> Result<FaceVerificationResponse, ServiceError> {
        let user_id = req.user_id;

        if user_id != session_user {
            self.audit.security_event(
                session_user,
                ViolationCode::SessionUserMismatch,
                json!({ "claimed_user_id": user_id, "stage": "verify_face" }),
                now,
            );
            return Ok(FaceVerificationResponse::rejected(
                FaceCode::SessionUserMismatch,
                vec!["Submitted user does not match the signed-in user".to_string()],
                None,
            ));
        }

        let claims = match self.tokens.verify(&req.proceed_token, now) {
            Ok(c) if c.sub == user_id && c.date == self.pipeline.local_date(now) => c,
            Ok(_) => {
                return Ok(FaceVerificationResponse::rejected(
                    FaceCode::InvalidProceedToken,
                    vec!["Validation was for another user or day, validate again".to_string()],
                    None,
                ));
            }
            Err(e) => {
                tracing::debug!("Rejected proceed token for {}: {}", user_id, e);
                return Ok(FaceVerificationResponse::rejected(
                    FaceCode::InvalidProceedToken,
                    vec!["Validation expired or invalid, validate again".to_string()],
                    None,
                ));
            }
        };

        let photo = CapturedPhoto::from_base64(&req.photo)?;

        // Reference photo comes from enrollment only
        let Some(enrolled) = self.store.enrolled_biometric(user_id).await? else {
            return Ok(FaceVerificationResponse::rejected(
                FaceCode::NoBiometricEnrolled,
                vec![ViolationCode::NoBiometricEnrolled.remedy().to_string()],
                None,
            ));
        };

        // Cheap read before the paid provider calls; the conditional commit still decides
        let today = self.store.record_for_day(user_id, claims.date).await?;
        if AttendanceStateTracker.propose(today.as_ref()) != Proposal::Next(claims.typ) {
            tracing::info!(
                "Attendance {} for {} on {} no longer applicable, skipping face check",
                claims.typ.as_str(),
                user_id,
                claims.date
            );
            return Ok(already_recorded(claims.typ, None));
        }

        let outcome = match self.chain.verify(&photo, &enrolled.reference_photo_url).await {
            Ok(o) => o,
            Err(FaceChainError::AllProvidersFailed { last_error, attempts }) => {
                tracing::error!("Face verification unavailable for {}: {}", user_id, last_error);
                return Ok(FaceVerificationResponse::rejected(
                    FaceCode::AllProvidersFailed,
                    vec![format!("Face verification is temporarily unavailable ({})", last_error)],
                    Some(FaceResponseData {
                        attendance_type: Some(claims.typ),
                        record: None,
                        provider: None,
                        match_score: None,
                        confidence: None,
                        attempts,
                    }),
                ));
            }
        };

        let result = outcome.result;
        let verdict = self.acceptance.evaluate(&result);

        self.audit.face_attempt(NewFaceVerificationLog {
            user_id,
            provider_name: result.provider_name.clone(),
            success: result.success,
            face_detected: result.face_detected,
            match_score: result.match_score,
            confidence: result.confidence,
            is_live: result.is_live,
            is_fake: result.is_fake,
            accepted: verdict.accepted,
            reasoning: result.reasoning.clone(),
            photo_sha256: photo.sha256().to_string(),
        });

        let mut data = FaceResponseData {
            attendance_type: Some(claims.typ),
            record: None,
            provider: Some(result.provider_name.clone()),
            match_score: Some(result.match_score),
            confidence: Some(result.confidence),
            attempts: outcome.attempts,
        };

        if !verdict.accepted {
            tracing::info!(
                "Face not matched for {} by {}: {:?}",
                user_id,
                result.provider_name,
                verdict.reasons
            );
            let reasons = verdict.reasons.iter().map(|r| r.message()).collect();
            return Ok(FaceVerificationResponse::rejected(FaceCode::FaceNotMatched, reasons, Some(data)));
        }

        let committed = match claims.typ {
            AttendanceType::CheckIn => {
                self.store
                    .commit_check_in(NewCheckIn {
                        user_id,
                        date: claims.date,
                        at: now,
                        distance_meters: claims.dist,
                        network_signature: claims.net.clone(),
                        security_score: claims.score as i32,
                    })
                    .await?
            }
            AttendanceType::CheckOut => self.store.commit_check_out(user_id, claims.date, now).await?,
        };

        match committed {
            CommitOutcome::Committed(record) => {
                tracing::info!("Attendance {} committed for {} on {}", claims.typ.as_str(), user_id, claims.date);
                data.record = Some(record);
                Ok(FaceVerificationResponse {
                    success: true,
                    verified: true,
                    code: None,
                    reasons: Vec::new(),
                    data: Some(data),
                })
            }
            CommitOutcome::Conflict => {
                tracing::warn!(
                    "Attendance {} for {} on {} lost to a concurrent or repeated submit",
                    claims.typ.as_str(),
                    user_id,
                    claims.date
                );
                Ok(already_recorded(claims.typ, Some(data)))
            }
        }
    }

    pub async fn today(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<TodayStatus, ServiceError> {
        let date = self.pipeline.local_date(now);
        let record = self.store.record_for_day(user_id, date).await?;
        let state = match AttendanceStateTracker.state(record.as_ref()) {
            DayState::None => "NONE",
            DayState::CheckedIn => "CHECKED_IN",
            DayState::Completed => "COMPLETED",
        };
        Ok(TodayStatus { date, state, record })
    }
}

fn already_recorded(attendance_type: AttendanceType, data: Option<FaceResponseData>) -> FaceVerificationResponse {
    FaceVerificationResponse::rejected(
        FaceCode::AlreadyRecorded,
        vec![format!("{} is already recorded for today", attendance_type.as_str())],
        data,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use chrono::TimeZone;

    use super::*;
    use crate::face::{ChainMode, FaceProvider, FaceVerificationResult, ProviderError};
    use crate::models::{EnrollBiometric, UpsertLocationConfig};
    use crate::store::MemoryStore;

    struct FixedProvider {
        score: f64,
        fail: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(score: f64, fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self { score, fail, delay, calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FaceProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn available(&self) -> bool {
            true
        }

        async fn execute(
            &self,
            _captured: &CapturedPhoto,
            _reference_url: &str,
            _timeout: Duration,
        ) -> Result<FaceVerificationResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(ProviderError::Api("service down".to_string()));
            }
            Ok(FaceVerificationResult {
                success: true,
                face_detected: true,
                match_score: self.score,
                is_live: true,
                is_fake: false,
                confidence: 0.9,
                provider_name: "fixed".to_string(),
                reasoning: None,
            })
        }
    }

    fn morning() -> DateTime<Utc> {
        FixedOffset::east_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 4, 7, 10, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn photo() -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(b"\xff\xd8\xff\xe0 fake jpeg"))
    }

    fn evidence(user_id: Uuid, now: DateTime<Utc>) -> AttendanceEvidence {
        AttendanceEvidence {
            user_id,
            latitude: -6.2000,
            longitude: 106.8166,
            wifi_ssid: Some("SMK-WIFI".to_string()),
            ip_address: None,
            connection_type: None,
            fingerprint_hash: "abc123".to_string(),
            timestamp_millis: now.timestamp_millis(),
        }
    }

    async fn setup(score: f64, fail: bool) -> (Arc<MemoryStore>, AttendanceService, Uuid) {
        let (store, service, user, _) = setup_with(FixedProvider::new(score, fail, Duration::ZERO)).await;
        (store, service, user)
    }

    async fn setup_with(provider: Arc<FixedProvider>) -> (Arc<MemoryStore>, AttendanceService, Uuid, Arc<FixedProvider>) {
        let store = Arc::new(MemoryStore::new());
        store
            .replace_active_location(UpsertLocationConfig {
                name: "SMK".to_string(),
                reference_latitude: -6.2001,
                reference_longitude: 106.8167,
                radius_meters: 100.0,
                allowed_ssids: vec!["SMK-WIFI".to_string()],
                allowed_ip_ranges: vec![],
            })
            .await
            .unwrap();

        let user = Uuid::new_v4();
        store
            .replace_biometric(user, EnrollBiometric {
                fingerprint_hash: "abc123".to_string(),
                reference_photo_url: "https://cdn.example.com/ref/1.jpg".to_string(),
                credential_id: None,
            })
            .await
            .unwrap();

        let chain = FaceVerificationChain::new(ChainMode::Sequential)
            .with_provider(provider.clone(), Duration::from_secs(1));
        let service = AttendanceService::new(store.clone(), chain, &Config::for_tests());
        (store, service, user, provider)
    }

    async fn proceed_token(service: &AttendanceService, user: Uuid, now: DateTime<Utc>) -> String {
        let result = service.validate_security(user, &evidence(user, now), now).await.unwrap();
        assert!(result.success, "validation failed: {:?}", result.violations);
        result.data.unwrap().proceed_token.unwrap()
    }

    #[tokio::test]
    async fn test_check_in_then_check_out() {
        let (store, service, user) = setup(0.92, false).await;
        let now = morning();

        let token = proceed_token(&service, user, now).await;
        let req = VerifyFaceRequest { user_id: user, photo: photo(), proceed_token: token };
        let resp = service.verify_face(user, &req, now).await.unwrap();

        assert!(resp.success && resp.verified);
        let record = resp.data.unwrap().record.unwrap();
        assert_eq!(record.check_in_time, Some(now));
        assert!(record.check_out_time.is_none());

        let later = now + chrono::Duration::hours(8);
        let token = proceed_token(&service, user, later).await;
        let req = VerifyFaceRequest { user_id: user, photo: photo(), proceed_token: token };
        let resp = service.verify_face(user, &req, later).await.unwrap();

        assert!(resp.success);
        let data = resp.data.unwrap();
        assert_eq!(data.attendance_type, Some(AttendanceType::CheckOut));
        assert_eq!(data.record.unwrap().check_out_time, Some(later));

        let today = service.today(user, later).await.unwrap();
        assert_eq!(today.state, "COMPLETED");

        for _ in 0..50 {
            if store.face_logs().len() >= 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let logs = store.face_logs();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.accepted && l.photo_sha256.len() == 64));
    }

    #[tokio::test]
    async fn test_replayed_token_is_already_recorded() {
        let (_store, service, user) = setup(0.92, false).await;
        let now = morning();

        let token = proceed_token(&service, user, now).await;
        let req = VerifyFaceRequest { user_id: user, photo: photo(), proceed_token: token };

        let first = service.verify_face(user, &req, now).await.unwrap();
        assert!(first.success);

        let second = service.verify_face(user, &req, now).await.unwrap();
        assert!(!second.success);
        assert_eq!(second.code, Some(FaceCode::AlreadyRecorded));

        let today = service.today(user, now).await.unwrap();
        assert_eq!(today.record.unwrap().check_in_time, Some(now));
    }

    #[tokio::test]
    async fn test_low_match_is_rejected_without_commit() {
        let (_store, service, user) = setup(0.40, false).await;
        let now = morning();

        let token = proceed_token(&service, user, now).await;
        let req = VerifyFaceRequest { user_id: user, photo: photo(), proceed_token: token };
        let resp = service.verify_face(user, &req, now).await.unwrap();

        assert!(!resp.verified);
        assert_eq!(resp.code, Some(FaceCode::FaceNotMatched));
        assert_eq!(resp.reasons.len(), 1);
        assert_eq!(service.today(user, now).await.unwrap().state, "NONE");
    }

    #[tokio::test]
    async fn test_provider_outage_is_distinct_from_mismatch() {
        let (_store, service, user) = setup(0.92, true).await;
        let now = morning();

        let token = proceed_token(&service, user, now).await;
        let req = VerifyFaceRequest { user_id: user, photo: photo(), proceed_token: token };
        let resp = service.verify_face(user, &req, now).await.unwrap();

        assert_eq!(resp.code, Some(FaceCode::AllProvidersFailed));
        assert!(resp.reasons[0].contains("service down"));
        assert_eq!(service.today(user, now).await.unwrap().state, "NONE");
    }

    #[tokio::test]
    async fn test_token_bound_to_user_and_day() {
        let (_store, service, user) = setup(0.92, false).await;
        let now = morning();
        let token = proceed_token(&service, user, now).await;

        let other = Uuid::new_v4();
        let req = VerifyFaceRequest { user_id: other, photo: photo(), proceed_token: token.clone() };
        let resp = service.verify_face(other, &req, now).await.unwrap();
        assert_eq!(resp.code, Some(FaceCode::InvalidProceedToken));

        let req = VerifyFaceRequest { user_id: user, photo: photo(), proceed_token: token };
        let resp = service.verify_face(other, &req, now).await.unwrap();
        assert_eq!(resp.code, Some(FaceCode::SessionUserMismatch));

        let req = VerifyFaceRequest { user_id: user, photo: photo(), proceed_token: "garbage".to_string() };
        let resp = service.verify_face(user, &req, now).await.unwrap();
        assert_eq!(resp.code, Some(FaceCode::InvalidProceedToken));
    }

    #[tokio::test]
    async fn test_invalid_photo_is_an_error() {
        let (_store, service, user) = setup(0.92, false).await;
        let now = morning();
        let token = proceed_token(&service, user, now).await;

        let req = VerifyFaceRequest { user_id: user, photo: "%%%".to_string(), proceed_token: token };
        let err = service.verify_face(user, &req, now).await.unwrap_err();
        assert!(matches!(err, ServiceError::Photo(PhotoError::InvalidEncoding)));
    }

    #[tokio::test]
    async fn test_replayed_token_skips_providers() {
        let (_store, service, user, provider) =
            setup_with(FixedProvider::new(0.92, false, Duration::ZERO)).await;
        let now = morning();

        let token = proceed_token(&service, user, now).await;
        let req = VerifyFaceRequest { user_id: user, photo: photo(), proceed_token: token };
        assert!(service.verify_face(user, &req, now).await.unwrap().success);
        assert_eq!(provider.calls(), 1);

        let replay = service.verify_face(user, &req, now).await.unwrap();
        assert_eq!(replay.code, Some(FaceCode::AlreadyRecorded));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_submits_commit_once() {
        // Slow provider so both requests are past the state read before either commits
        let (store, service, user, provider) =
            setup_with(FixedProvider::new(0.92, false, Duration::from_millis(50))).await;
        let service = Arc::new(service);
        let now = morning();

        let token = proceed_token(&service, user, now).await;
        let req = VerifyFaceRequest { user_id: user, photo: photo(), proceed_token: token };

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let service = service.clone();
                let req = req.clone();
                tokio::spawn(async move { service.verify_face(user, &req, now).await })
            })
            .collect();

        let mut responses = Vec::new();
        for task in tasks {
            responses.push(task.await.unwrap().unwrap());
        }

        let committed = responses.iter().filter(|r| r.success).count();
        let lost = responses.iter().filter(|r| r.code == Some(FaceCode::AlreadyRecorded)).count();
        assert_eq!((committed, lost), (1, 1));
        assert_eq!(provider.calls(), 2);

        let records = store.recent_records(user, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].check_in_time, Some(now));
    }
}
