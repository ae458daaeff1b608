//! Attendance evidence validation
//!
//! Independent checks (network, geofence, device, day state, anomaly)
//! and the pipeline that runs them in order.

pub mod anomaly;
pub mod device;
pub mod geofence;
pub mod network;
pub mod pipeline;
pub mod state;
pub mod types;


pub use anomaly::{AnomalyReport, AnomalyScorer, AnomalySignal, BehaviorHistory};
pub use device::DeviceIdentityMatcher;
pub use geofence::{distance, GeoError, GeofenceOutcome, GeofenceValidator};
pub use network::{NetworkIdentityValidator, NetworkOutcome, NetworkTier};
pub use pipeline::{PipelineError, SecurityValidationPipeline};
pub use state::{AttendanceStateTracker, DayState, Proposal};
pub use types::*;
