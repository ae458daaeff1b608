//! Face verification learning log (append-only)

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FaceVerificationLog {
    pub id: i64,
    pub user_id: Uuid,
    pub provider_name: String,
    pub success: bool,
    pub face_detected: bool,
    pub match_score: f64,
    pub confidence: f64,
    pub is_live: bool,
    pub is_fake: bool,
    pub accepted: bool,
    pub reasoning: Option<String>,
    /// SHA-256 of the captured photo; the photo itself is not kept
    pub photo_sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFaceVerificationLog {
    pub user_id: Uuid,
    pub provider_name: String,
    pub success: bool,
    pub face_detected: bool,
    pub match_score: f64,
    pub confidence: f64,
    pub is_live: bool,
    pub is_fake: bool,
    pub accepted: bool,
    pub reasoning: Option<String>,
    pub photo_sha256: String,
}

impl FaceVerificationLog {
    pub async fn append(pool: &PgPool, data: &NewFaceVerificationLog) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO face_verification_logs
                (user_id, provider_name, success, face_detected, match_score, confidence,
                 is_live, is_fake, accepted, reasoning, photo_sha256)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#
        )
        .bind(data.user_id)
        .bind(&data.provider_name)
        .bind(data.success)
        .bind(data.face_detected)
        .bind(data.match_score)
        .bind(data.confidence)
        .bind(data.is_live)
        .bind(data.is_fake)
        .bind(data.accepted)
        .bind(&data.reasoning)
        .bind(&data.photo_sha256)
        .execute(pool)
        .await?;
        Ok(())
    }
}
