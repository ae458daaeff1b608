//! Attendance record model
//!
//! One row per (user_id, date). Created by the first committed check-in,
//! mutated once by check-out, terminal afterwards. Both writes are
//! conditional so a double submit can only commit once.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_in_distance_meters: Option<f64>,
    /// SSID, or the /24 of the client IP when no SSID was readable
    pub network_signature: Option<String>,
    pub security_score: i32,
    pub created_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn is_completed(&self) -> bool {
        self.check_out_time.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewCheckIn {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub at: DateTime<Utc>,
    pub distance_meters: f64,
    pub network_signature: Option<String>,
    pub security_score: i32,
}

impl AttendanceRecord {
    pub async fn find_for_day(pool: &PgPool, user_id: Uuid, date: NaiveDate) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AttendanceRecord>(
            "SELECT * FROM attendance_records WHERE user_id = $1 AND date = $2"
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_recent(pool: &PgPool, user_id: Uuid, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AttendanceRecord>(
            r#"
            SELECT * FROM attendance_records
            WHERE user_id = $1
            ORDER BY date DESC
            LIMIT $2
            "#
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Atomic: insert today's row only if none exists.
    /// Returns None when another request already committed it.
    pub async fn try_check_in(pool: &PgPool, data: &NewCheckIn) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AttendanceRecord>(
            r#"
            INSERT INTO attendance_records
                (user_id, date, check_in_time, check_in_distance_meters, network_signature, security_score)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, date) DO NOTHING
            RETURNING *
            "#
        )
        .bind(data.user_id)
        .bind(data.date)
        .bind(data.at)
        .bind(data.distance_meters)
        .bind(&data.network_signature)
        .bind(data.security_score)
        .fetch_optional(pool)
        .await
    }

    /// Atomic: set check_out_time only on an open record.
    /// Returns None when the record is missing or already closed.
    pub async fn try_check_out(
        pool: &PgPool,
        user_id: Uuid,
        date: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AttendanceRecord>(
            r#"
            UPDATE attendance_records
            SET check_out_time = $3
            WHERE user_id = $1
              AND date = $2
              AND check_in_time IS NOT NULL
              AND check_out_time IS NULL
            RETURNING *
            "#
        )
        .bind(user_id)
        .bind(date)
        .bind(at)
        .fetch_optional(pool)
        .await
    }
}
