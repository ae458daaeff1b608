//! Acceptance rule applied to a provider verdict
//!
//! Accept iff a face was detected, the match score and confidence reach
//! their minimums, and the photo is not flagged as fake. Every failing
//! condition is reported.

use serde::Serialize;

use crate::config::FaceSettings;
use super::types::FaceVerificationResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    FaceNotDetected,
    LowMatchScore { score: f64, required: f64 },
    SuspectedFake,
    LowConfidence { confidence: f64, required: f64 },
}

impl RejectReason {
    pub fn message(&self) -> String {
        match self {
            Self::FaceNotDetected => "No face detected in the photo".to_string(),
            Self::LowMatchScore { score, required } => format!(
                "Face does not match the enrolled photo ({:.0}% < {:.0}%)",
                score * 100.0,
                required * 100.0
            ),
            Self::SuspectedFake => "Photo looks like a screen, print or other spoof".to_string(),
            Self::LowConfidence { confidence, required } => format!(
                "Verification confidence too low ({:.0}% < {:.0}%)",
                confidence * 100.0,
                required * 100.0
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub accepted: bool,
    pub reasons: Vec<RejectReason>,
}

#[derive(Debug, Clone, Copy)]
pub struct FaceAcceptance {
    pub min_match_score: f64,
    pub min_confidence: f64,
}

impl Default for FaceAcceptance {
    fn default() -> Self {
        Self { min_match_score: 0.70, min_confidence: 0.70 }
    }
}

impl From<&FaceSettings> for FaceAcceptance {
    fn from(settings: &FaceSettings) -> Self {
        Self {
            min_match_score: settings.min_match_score,
            min_confidence: settings.min_confidence,
        }
    }
}

impl FaceAcceptance {
    pub fn evaluate(&self, result: &FaceVerificationResult) -> Verdict {
        let mut reasons = Vec::new();

        if !result.face_detected {
            reasons.push(RejectReason::FaceNotDetected);
        }
        if result.match_score < self.min_match_score {
            reasons.push(RejectReason::LowMatchScore {
                score: result.match_score,
                required: self.min_match_score,
            });
        }
        if result.is_fake {
            reasons.push(RejectReason::SuspectedFake);
        }
        if result.confidence < self.min_confidence {
            reasons.push(RejectReason::LowConfidence {
                confidence: result.confidence,
                required: self.min_confidence,
            });
        }

        Verdict {
            accepted: reasons.is_empty(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(detected: bool, score: f64, fake: bool, confidence: f64) -> FaceVerificationResult {
        FaceVerificationResult {
            success: true,
            face_detected: detected,
            match_score: score,
            is_live: !fake,
            is_fake: fake,
            confidence,
            provider_name: "test".to_string(),
            reasoning: None,
        }
    }

    #[test]
    fn test_accepts_good_match() {
        let verdict = FaceAcceptance::default().evaluate(&result(true, 0.91, false, 0.88));
        assert!(verdict.accepted);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let verdict = FaceAcceptance::default().evaluate(&result(true, 0.70, false, 0.70));
        assert!(verdict.accepted);
    }

    #[test]
    fn test_reports_every_failure() {
        let verdict = FaceAcceptance::default().evaluate(&result(false, 0.2, true, 0.1));
        assert!(!verdict.accepted);
        assert_eq!(verdict.reasons.len(), 4);
        assert_eq!(verdict.reasons[0], RejectReason::FaceNotDetected);
        assert!(matches!(verdict.reasons[1], RejectReason::LowMatchScore { .. }));
        assert_eq!(verdict.reasons[2], RejectReason::SuspectedFake);
        assert!(matches!(verdict.reasons[3], RejectReason::LowConfidence { .. }));
    }

    #[test]
    fn test_fake_alone_rejects() {
        let verdict = FaceAcceptance::default().evaluate(&result(true, 0.99, true, 0.99));
        assert!(!verdict.accepted);
        assert_eq!(verdict.reasons, vec![RejectReason::SuspectedFake]);
    }

    #[test]
    fn test_reason_messages() {
        let msg = RejectReason::LowMatchScore { score: 0.5, required: 0.7 }.message();
        assert!(msg.contains("50%"));
        assert!(msg.contains("70%"));
    }
}
