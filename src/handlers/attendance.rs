//! Attendance handlers

use std::net::SocketAddr;

use axum::{extract::{ConnectInfo, State}, http::HeaderMap, Json};
use chrono::Utc;
use validator::Validate;

use crate::{AppState, AppResult};
use crate::middleware::auth::{client_ip, UserContext};
use crate::service::{FaceVerificationResponse, TodayStatus, VerifyFaceRequest};
use crate::validation::{AttendanceEvidence, ValidationResult};

/// Run the security pipeline for a check-in or check-out attempt
pub async fn validate(
    State(state): State<AppState>,
    user: UserContext,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(mut evidence): Json<AttendanceEvidence>,
) -> AppResult<Json<ValidationResult>> {
    evidence.validate()?;

    let peer = peer.map(|ConnectInfo(addr)| addr.ip());
    evidence.ip_address = client_ip(&headers, peer, state.config.trusted_proxy_hops);

    let result = state.service.validate_security(user.user_id, &evidence, Utc::now()).await?;

    tracing::debug!(
        "Validation for {}: success={} score={}",
        user.user_id,
        result.success,
        result.security_score
    );

    Ok(Json(result))
}

/// Face check, then commit the proposed attendance
pub async fn verify_face(
    State(state): State<AppState>,
    user: UserContext,
    Json(req): Json<VerifyFaceRequest>,
) -> AppResult<Json<FaceVerificationResponse>> {
    req.validate()?;

    let resp = state.service.verify_face(user.user_id, &req, Utc::now()).await?;
    Ok(Json(resp))
}

/// Today's attendance state for the signed-in user
pub async fn today(
    State(state): State<AppState>,
    user: UserContext,
) -> AppResult<Json<TodayStatus>> {
    let status = state.service.today(user.user_id, Utc::now()).await?;
    Ok(Json(status))
}
