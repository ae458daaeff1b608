//! PostgreSQL-backed store

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AttendanceStore, CommitOutcome, StoreResult};
use crate::models::{
    AttendanceRecord, EnrollBiometric, EnrolledBiometric, FaceVerificationLog, LocationConfig,
    NewCheckIn, NewFaceVerificationLog, NewSecurityEvent, SecurityEvent, UpsertLocationConfig,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn active_location(&self) -> StoreResult<Option<LocationConfig>> {
        Ok(LocationConfig::find_active(&self.pool).await?)
    }

    async fn replace_active_location(&self, data: UpsertLocationConfig) -> StoreResult<LocationConfig> {
        Ok(LocationConfig::replace_active(&self.pool, data).await?)
    }

    async fn enrolled_biometric(&self, user_id: Uuid) -> StoreResult<Option<EnrolledBiometric>> {
        Ok(EnrolledBiometric::find_by_user(&self.pool, user_id).await?)
    }

    async fn replace_biometric(&self, user_id: Uuid, data: EnrollBiometric) -> StoreResult<EnrolledBiometric> {
        Ok(EnrolledBiometric::replace(&self.pool, user_id, data).await?)
    }

    async fn delete_biometric(&self, user_id: Uuid) -> StoreResult<bool> {
        Ok(EnrolledBiometric::delete(&self.pool, user_id).await?)
    }

    async fn record_for_day(&self, user_id: Uuid, date: NaiveDate) -> StoreResult<Option<AttendanceRecord>> {
        Ok(AttendanceRecord::find_for_day(&self.pool, user_id, date).await?)
    }

    async fn recent_records(&self, user_id: Uuid, limit: usize) -> StoreResult<Vec<AttendanceRecord>> {
        Ok(AttendanceRecord::list_recent(&self.pool, user_id, limit as i64).await?)
    }

    async fn commit_check_in(&self, data: NewCheckIn) -> StoreResult<CommitOutcome> {
        Ok(match AttendanceRecord::try_check_in(&self.pool, &data).await? {
            Some(record) => CommitOutcome::Committed(record),
            None => CommitOutcome::Conflict,
        })
    }

    async fn commit_check_out(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        at: DateTime<Utc>,
    ) -> StoreResult<CommitOutcome> {
        Ok(match AttendanceRecord::try_check_out(&self.pool, user_id, date, at).await? {
            Some(record) => CommitOutcome::Committed(record),
            None => CommitOutcome::Conflict,
        })
    }

    async fn append_security_event(&self, event: NewSecurityEvent) -> StoreResult<()> {
        Ok(SecurityEvent::append(&self.pool, &event).await?)
    }

    async fn security_events_since(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<Vec<SecurityEvent>> {
        Ok(SecurityEvent::list_since(&self.pool, user_id, since).await?)
    }

    async fn recent_security_events(&self, limit: usize) -> StoreResult<Vec<SecurityEvent>> {
        Ok(SecurityEvent::list_recent(&self.pool, limit as i64).await?)
    }

    async fn append_face_log(&self, entry: NewFaceVerificationLog) -> StoreResult<()> {
        Ok(FaceVerificationLog::append(&self.pool, &entry).await?)
    }
}
