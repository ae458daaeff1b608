//! Face verification
//!
//! A chain of interchangeable providers behind one trait, plus the
//! acceptance rule the caller applies to whichever verdict comes back.

pub mod acceptance;
pub mod chain;
pub mod providers;
pub mod types;


pub use acceptance::{FaceAcceptance, RejectReason, Verdict};
pub use chain::{AttemptOutcome, ChainMode, ChainOutcome, FaceChainError, FaceVerificationChain, ProviderAttempt};
pub use providers::build_chain;
pub use types::{CapturedPhoto, FaceProvider, FaceVerificationResult, PhotoError, ProviderError};
