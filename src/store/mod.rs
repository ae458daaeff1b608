//! Record store abstraction
//!
//! The pipeline and the face flow only see this trait. `PgStore` backs it
//! with PostgreSQL; `MemoryStore` keeps everything in-process.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    AttendanceRecord, EnrollBiometric, EnrolledBiometric, LocationConfig, NewCheckIn,
    NewFaceVerificationLog, NewSecurityEvent, SecurityEvent, UpsertLocationConfig,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a conditional attendance write
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(AttendanceRecord),
    /// The (user, date) row was already in a state that forbids this write
    Conflict,
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn active_location(&self) -> StoreResult<Option<LocationConfig>>;

    async fn replace_active_location(&self, data: UpsertLocationConfig) -> StoreResult<LocationConfig>;

    async fn enrolled_biometric(&self, user_id: Uuid) -> StoreResult<Option<EnrolledBiometric>>;

    async fn replace_biometric(&self, user_id: Uuid, data: EnrollBiometric) -> StoreResult<EnrolledBiometric>;

    async fn delete_biometric(&self, user_id: Uuid) -> StoreResult<bool>;

    async fn record_for_day(&self, user_id: Uuid, date: NaiveDate) -> StoreResult<Option<AttendanceRecord>>;

    async fn recent_records(&self, user_id: Uuid, limit: usize) -> StoreResult<Vec<AttendanceRecord>>;

    async fn commit_check_in(&self, data: NewCheckIn) -> StoreResult<CommitOutcome>;

    async fn commit_check_out(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        at: DateTime<Utc>,
    ) -> StoreResult<CommitOutcome>;

    async fn append_security_event(&self, event: NewSecurityEvent) -> StoreResult<()>;

    async fn security_events_since(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<Vec<SecurityEvent>>;

    async fn recent_security_events(&self, limit: usize) -> StoreResult<Vec<SecurityEvent>>;

    async fn append_face_log(&self, entry: NewFaceVerificationLog) -> StoreResult<()>;
}
