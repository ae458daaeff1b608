//! Data models

pub mod location;
pub mod biometric;
pub mod attendance;
pub mod security_event;
pub mod face_log;

pub use location::*;
pub use biometric::*;
pub use attendance::*;
pub use security_event::*;
pub use face_log::*;
