//! Location configuration model (geofence + network allow-lists)

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LocationConfig {
    pub id: Uuid,
    pub name: String,
    pub reference_latitude: f64,
    pub reference_longitude: f64,
    pub radius_meters: f64,
    pub allowed_ssids: Vec<String>,
    /// Literal prefixes ("192.168.") or CIDR blocks ("192.168.1.0/24")
    pub allowed_ip_ranges: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertLocationConfig {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub reference_latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub reference_longitude: f64,
    #[validate(range(min = 1.0, max = 100000.0))]
    pub radius_meters: f64,
    #[serde(default)]
    pub allowed_ssids: Vec<String>,
    #[serde(default)]
    pub allowed_ip_ranges: Vec<String>,
}

impl UpsertLocationConfig {
    /// Trim and dedupe allow-lists; they are sets
    pub fn normalized(mut self) -> Self {
        self.allowed_ssids = dedupe(self.allowed_ssids);
        self.allowed_ip_ranges = dedupe(self.allowed_ip_ranges);
        self
    }
}

fn dedupe(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        let v = v.trim().to_string();
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

impl LocationConfig {
    pub async fn find_active(pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, LocationConfig>(
            "SELECT * FROM location_configs WHERE is_active = true LIMIT 1"
        )
        .fetch_optional(pool)
        .await
    }

    /// Replace the active configuration.
    /// Previous active row is deactivated in the same transaction.
    pub async fn replace_active(pool: &PgPool, data: UpsertLocationConfig) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE location_configs SET is_active = false, updated_at = NOW() WHERE is_active = true")
            .execute(&mut *tx)
            .await?;

        let config = sqlx::query_as::<_, LocationConfig>(
            r#"
            INSERT INTO location_configs
                (name, reference_latitude, reference_longitude, radius_meters, allowed_ssids, allowed_ip_ranges, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, true)
            RETURNING *
            "#
        )
        .bind(&data.name)
        .bind(data.reference_latitude)
        .bind(data.reference_longitude)
        .bind(data.radius_meters)
        .bind(&data.allowed_ssids)
        .bind(&data.allowed_ip_ranges)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(config)
    }
}
