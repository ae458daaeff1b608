//! In-process store used for local runs and tests

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{AttendanceStore, CommitOutcome, StoreResult};
use crate::models::{
    AttendanceRecord, EnrollBiometric, EnrolledBiometric, LocationConfig, NewCheckIn,
    NewFaceVerificationLog, NewSecurityEvent, SecurityEvent, UpsertLocationConfig,
};

#[derive(Default)]
struct Inner {
    locations: Vec<LocationConfig>,
    biometrics: HashMap<Uuid, EnrolledBiometric>,
    records: HashMap<(Uuid, NaiveDate), AttendanceRecord>,
    security_events: Vec<SecurityEvent>,
    face_logs: Vec<NewFaceVerificationLog>,
}

/// Every write takes the single write lock, which gives the same
/// one-winner guarantee as the unique constraint in Postgres.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly (history for anomaly scoring)
    pub fn insert_record(&self, record: AttendanceRecord) {
        self.inner.write().records.insert((record.user_id, record.date), record);
    }

    pub fn face_logs(&self) -> Vec<NewFaceVerificationLog> {
        self.inner.read().face_logs.clone()
    }

    pub fn security_event_count(&self, user_id: Uuid) -> usize {
        self.inner.read().security_events.iter().filter(|e| e.user_id == user_id).count()
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn active_location(&self) -> StoreResult<Option<LocationConfig>> {
        Ok(self.inner.read().locations.iter().find(|l| l.is_active).cloned())
    }

    async fn replace_active_location(&self, data: UpsertLocationConfig) -> StoreResult<LocationConfig> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        for loc in inner.locations.iter_mut().filter(|l| l.is_active) {
            loc.is_active = false;
            loc.updated_at = now;
        }
        let config = LocationConfig {
            id: Uuid::new_v4(),
            name: data.name,
            reference_latitude: data.reference_latitude,
            reference_longitude: data.reference_longitude,
            radius_meters: data.radius_meters,
            allowed_ssids: data.allowed_ssids,
            allowed_ip_ranges: data.allowed_ip_ranges,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        inner.locations.push(config.clone());
        Ok(config)
    }

    async fn enrolled_biometric(&self, user_id: Uuid) -> StoreResult<Option<EnrolledBiometric>> {
        Ok(self.inner.read().biometrics.get(&user_id).cloned())
    }

    async fn replace_biometric(&self, user_id: Uuid, data: EnrollBiometric) -> StoreResult<EnrolledBiometric> {
        let enrolled = EnrolledBiometric {
            user_id,
            reference_fingerprint_hash: data.fingerprint_hash,
            reference_photo_url: data.reference_photo_url,
            credential_id: data.credential_id,
            enrolled_at: Utc::now(),
        };
        self.inner.write().biometrics.insert(user_id, enrolled.clone());
        Ok(enrolled)
    }

    async fn delete_biometric(&self, user_id: Uuid) -> StoreResult<bool> {
        Ok(self.inner.write().biometrics.remove(&user_id).is_some())
    }

    async fn record_for_day(&self, user_id: Uuid, date: NaiveDate) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self.inner.read().records.get(&(user_id, date)).cloned())
    }

    async fn recent_records(&self, user_id: Uuid, limit: usize) -> StoreResult<Vec<AttendanceRecord>> {
        let inner = self.inner.read();
        let mut records: Vec<AttendanceRecord> = inner
            .records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date));
        records.truncate(limit);
        Ok(records)
    }

    async fn commit_check_in(&self, data: NewCheckIn) -> StoreResult<CommitOutcome> {
        let mut inner = self.inner.write();
        let key = (data.user_id, data.date);
        if inner.records.contains_key(&key) {
            return Ok(CommitOutcome::Conflict);
        }
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            date: data.date,
            check_in_time: Some(data.at),
            check_out_time: None,
            check_in_distance_meters: Some(data.distance_meters),
            network_signature: data.network_signature,
            security_score: data.security_score,
            created_at: data.at,
        };
        inner.records.insert(key, record.clone());
        Ok(CommitOutcome::Committed(record))
    }

    async fn commit_check_out(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        at: DateTime<Utc>,
    ) -> StoreResult<CommitOutcome> {
        let mut inner = self.inner.write();
        match inner.records.get_mut(&(user_id, date)) {
            Some(record) if record.check_in_time.is_some() && record.check_out_time.is_none() => {
                record.check_out_time = Some(at);
                Ok(CommitOutcome::Committed(record.clone()))
            }
            _ => Ok(CommitOutcome::Conflict),
        }
    }

    async fn append_security_event(&self, event: NewSecurityEvent) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let id = inner.security_events.len() as i64 + 1;
        inner.security_events.push(SecurityEvent {
            id,
            user_id: event.user_id,
            event_type: event.event_type,
            severity: event.severity,
            details: event.details,
            created_at: event.at,
        });
        Ok(())
    }

    async fn security_events_since(&self, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<Vec<SecurityEvent>> {
        let inner = self.inner.read();
        let mut events: Vec<SecurityEvent> = inner
            .security_events
            .iter()
            .filter(|e| e.user_id == user_id && e.created_at >= since)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    async fn recent_security_events(&self, limit: usize) -> StoreResult<Vec<SecurityEvent>> {
        let inner = self.inner.read();
        Ok(inner.security_events.iter().rev().take(limit).cloned().collect())
    }

    async fn append_face_log(&self, entry: NewFaceVerificationLog) -> StoreResult<()> {
        self.inner.write().face_logs.push(entry);
        Ok(())
    }
}
