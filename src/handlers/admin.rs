//! Administrative handlers

use axum::{extract::{Path, Query, State}, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppResult, AppError};
use crate::middleware::auth::UserContext;
use crate::models::{EnrollBiometric, EnrolledBiometric, LocationConfig, SecurityEvent, UpsertLocationConfig};

const DEFAULT_EVENT_LIMIT: usize = 100;
const MAX_EVENT_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub limit: Option<usize>,
}

/// Replace the active location configuration
pub async fn put_location(
    State(state): State<AppState>,
    user: UserContext,
    Json(req): Json<UpsertLocationConfig>,
) -> AppResult<Json<LocationConfig>> {
    req.validate()?;

    let location = state.service.store().replace_active_location(req.normalized()).await?;
    tracing::info!("Location '{}' activated by {}", location.name, user.user_id);

    Ok(Json(location))
}

/// Enroll or re-enroll a user's device fingerprint and reference photo
pub async fn put_biometric(
    State(state): State<AppState>,
    user: UserContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<EnrollBiometric>,
) -> AppResult<Json<EnrolledBiometric>> {
    req.validate()?;

    let enrolled = state.service.store().replace_biometric(user_id, req).await?;
    tracing::info!("Biometric for {} enrolled by {}", user_id, user.user_id);

    Ok(Json(enrolled))
}

pub async fn delete_biometric(
    State(state): State<AppState>,
    user: UserContext,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    if !state.service.store().delete_biometric(user_id).await? {
        return Err(AppError::NotFound("Biometric enrollment not found".to_string()));
    }
    tracing::info!("Biometric for {} removed by {}", user_id, user.user_id);

    Ok(Json(json!({ "deleted": true, "userId": user_id })))
}

/// Most recent security events, newest first
pub async fn security_events(
    State(state): State<AppState>,
    _user: UserContext,
    Query(query): Query<EventQuery>,
) -> AppResult<Json<Vec<SecurityEvent>>> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT).clamp(1, MAX_EVENT_LIMIT);
    let events = state.service.store().recent_security_events(limit).await?;
    Ok(Json(events))
}
