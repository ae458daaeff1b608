//! Behavioral anomaly scoring
//!
//! Compares the current attempt with the user's rolling history and returns
//! 0-100 (higher = more suspicious). Advisory only: the pipeline turns a
//! high score into a warning, never into a rejection.

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AttendanceRecord, SecurityEvent};
use super::types::{AttendanceType, ViolationCode};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Records considered for the network/time baseline
pub const HISTORY_RECORDS: usize = 30;

/// Security events older than this are ignored
pub const EVENT_LOOKBACK_HOURS: i64 = 24;

/// Minimum baseline before network/time deviation counts
const MIN_BASELINE: usize = 3;

const RAPID_WINDOW_MINUTES: i64 = 10;

// ============================================================================
// SIGNALS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalySignal {
    UnfamiliarNetwork,
    UnusualTime,
    VeryUnusualTime,
    RapidRepeats,
    RecentDeviceMismatch,
}

impl AnomalySignal {
    pub fn description(&self) -> &'static str {
        match self {
            Self::UnfamiliarNetwork => "Network never seen in this user's history",
            Self::UnusualTime => "More than 2 hours from the usual time",
            Self::VeryUnusualTime => "More than 4 hours from the usual time",
            Self::RapidRepeats => "Several rejected attempts in the last minutes",
            Self::RecentDeviceMismatch => "Device fingerprint mismatches in the last day",
        }
    }
}

/// Everything the scorer looks at
#[derive(Debug, Clone, Default)]
pub struct BehaviorHistory {
    pub records: Vec<AttendanceRecord>,
    pub events: Vec<SecurityEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub score: u8,
    pub signals: Vec<AnomalySignal>,
}

pub struct AnomalyScorer {
    offset: FixedOffset,
}

impl AnomalyScorer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn score(
        &self,
        history: &BehaviorHistory,
        attendance_type: AttendanceType,
        network_signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> AnomalyReport {
        let mut total: u32 = 0;
        let mut signals = Vec::new();

        // Unfamiliar network
        let known: Vec<&str> = history
            .records
            .iter()
            .filter_map(|r| r.network_signature.as_deref())
            .collect();
        if let Some(sig) = network_signature {
            if known.len() >= MIN_BASELINE && !known.contains(&sig) {
                total += 35;
                signals.push(AnomalySignal::UnfamiliarNetwork);
            }
        }

        // Time of day against the same kind of event
        let past_times: Vec<DateTime<Utc>> = history
            .records
            .iter()
            .filter_map(|r| match attendance_type {
                AttendanceType::CheckIn => r.check_in_time,
                AttendanceType::CheckOut => r.check_out_time,
            })
            .collect();
        if past_times.len() >= MIN_BASELINE {
            let hours: Vec<f64> = past_times.iter().map(|t| self.local_hour(*t)).collect();
            let deviation = hour_distance(self.local_hour(now), circular_mean_hour(&hours));
            if deviation > 4.0 {
                total += 35;
                signals.push(AnomalySignal::VeryUnusualTime);
            } else if deviation > 2.0 {
                total += 20;
                signals.push(AnomalySignal::UnusualTime);
            }
        }

        // Rapid rejected attempts
        let rapid_since = now - Duration::minutes(RAPID_WINDOW_MINUTES);
        let rapid = history.events.iter().filter(|e| e.created_at >= rapid_since).count() as u32;
        if rapid > 0 {
            total += (rapid * 15).min(45);
            signals.push(AnomalySignal::RapidRepeats);
        }

        // Device mismatches today
        let day_since = now - Duration::hours(EVENT_LOOKBACK_HOURS);
        let mismatches = history
            .events
            .iter()
            .filter(|e| e.created_at >= day_since && e.event_type == ViolationCode::FingerprintMismatch.as_str())
            .count() as u32;
        if mismatches > 0 {
            total += (mismatches * 10).min(30);
            signals.push(AnomalySignal::RecentDeviceMismatch);
        }

        AnomalyReport {
            score: total.min(100) as u8,
            signals,
        }
    }

    fn local_hour(&self, t: DateTime<Utc>) -> f64 {
        let local = t.with_timezone(&self.offset);
        local.hour() as f64 + local.minute() as f64 / 60.0
    }
}

/// Mean on the 24h clock, so 23:00 and 01:00 average to midnight
fn circular_mean_hour(hours: &[f64]) -> f64 {
    let (sin, cos) = hours.iter().fold((0.0, 0.0), |(s, c), h| {
        let angle = h / 24.0 * std::f64::consts::TAU;
        (s + angle.sin(), c + angle.cos())
    });
    let mean = sin.atan2(cos) / std::f64::consts::TAU * 24.0;
    mean.rem_euclid(24.0)
}

/// Shortest distance between two clock hours, 0..=12
fn hour_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(24.0);
    d.min(24.0 - d)
}
