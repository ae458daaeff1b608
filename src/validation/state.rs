//! Per-day attendance state
//!
//! NONE -> CHECKED_IN -> COMPLETED. Only proposes the next action; the
//! write happens after face verification, through the store's
//! conditional commit.

use crate::models::AttendanceRecord;
use super::types::AttendanceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayState {
    None,
    CheckedIn,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proposal {
    Next(AttendanceType),
    AlreadyCompleted,
}

pub struct AttendanceStateTracker;

impl AttendanceStateTracker {
    pub fn state(&self, today: Option<&AttendanceRecord>) -> DayState {
        match today {
            None => DayState::None,
            Some(r) if r.check_out_time.is_some() => DayState::Completed,
            Some(r) if r.check_in_time.is_some() => DayState::CheckedIn,
            // Row without a check-in never gets committed; treat as empty
            Some(_) => DayState::None,
        }
    }

    pub fn propose(&self, today: Option<&AttendanceRecord>) -> Proposal {
        match self.state(today) {
            DayState::None => Proposal::Next(AttendanceType::CheckIn),
            DayState::CheckedIn => Proposal::Next(AttendanceType::CheckOut),
            DayState::Completed => Proposal::AlreadyCompleted,
        }
    }
}
