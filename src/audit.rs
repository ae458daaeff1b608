//! Fire-and-forget audit writes
//!
//! Security events and face-verification attempts are appended on a spawned
//! task. A failed write is logged and dropped; it never changes a decision.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{NewFaceVerificationLog, NewSecurityEvent};
use crate::store::AttendanceStore;
use crate::validation::{Severity, ViolationCode};

#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AttendanceStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    pub fn security_event(&self, user_id: Uuid, code: ViolationCode, details: Value, at: DateTime<Utc>) {
        let severity: Severity = code.severity();
        tracing::warn!(
            user_id = %user_id,
            event = code.as_str(),
            severity = severity.as_str(),
            "Security event"
        );

        let event = NewSecurityEvent {
            user_id,
            event_type: code.as_str().to_string(),
            severity: severity.as_str().to_string(),
            details: Some(details),
            at,
        };
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.append_security_event(event).await {
                tracing::warn!("Failed to record security event: {}", e);
            }
        });
    }

    pub fn face_attempt(&self, entry: NewFaceVerificationLog) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.append_face_log(entry).await {
                tracing::warn!("Failed to append face verification log: {}", e);
            }
        });
    }
}
