//! Security event model (append-only audit log)

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecurityEvent {
    pub id: i64,
    pub user_id: Uuid,
    /// Violation code, e.g. FINGERPRINT_MISMATCH
    pub event_type: String,
    pub severity: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub user_id: Uuid,
    pub event_type: String,
    pub severity: String,
    pub details: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

impl SecurityEvent {
    pub async fn append(pool: &PgPool, data: &NewSecurityEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO security_events (user_id, event_type, severity, details, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#
        )
        .bind(data.user_id)
        .bind(&data.event_type)
        .bind(&data.severity)
        .bind(&data.details)
        .bind(data.at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list_since(pool: &PgPool, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, SecurityEvent>(
            r#"
            SELECT * FROM security_events
            WHERE user_id = $1 AND created_at >= $2
            ORDER BY created_at DESC
            "#
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(pool)
        .await
    }

    pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, SecurityEvent>(
            "SELECT * FROM security_events ORDER BY created_at DESC LIMIT $1"
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
