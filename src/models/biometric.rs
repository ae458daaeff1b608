//! Enrolled biometric model

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EnrolledBiometric {
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub reference_fingerprint_hash: String,
    pub reference_photo_url: String,
    pub credential_id: Option<String>,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EnrollBiometric {
    #[validate(length(min = 1, max = 512))]
    pub fingerprint_hash: String,
    #[validate(url)]
    pub reference_photo_url: String,
    #[serde(default)]
    pub credential_id: Option<String>,
}

impl EnrolledBiometric {
    pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EnrolledBiometric>("SELECT * FROM enrolled_biometrics WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Enroll or re-enroll; re-enrollment replaces every field
    pub async fn replace(pool: &PgPool, user_id: Uuid, data: EnrollBiometric) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, EnrolledBiometric>(
            r#"
            INSERT INTO enrolled_biometrics (user_id, reference_fingerprint_hash, reference_photo_url, credential_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                reference_fingerprint_hash = EXCLUDED.reference_fingerprint_hash,
                reference_photo_url = EXCLUDED.reference_photo_url,
                credential_id = EXCLUDED.credential_id,
                enrolled_at = NOW()
            RETURNING *
            "#
        )
        .bind(user_id)
        .bind(&data.fingerprint_hash)
        .bind(&data.reference_photo_url)
        .bind(&data.credential_id)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM enrolled_biometrics WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
