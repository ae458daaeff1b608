//! Device fingerprint match
//!
//! Exact equality against the enrolled hash. There is no similarity score.

pub struct DeviceIdentityMatcher;

impl DeviceIdentityMatcher {
    /// Equal-length comparison runs over every byte
    pub fn matches(&self, submitted: &str, enrolled: &str) -> bool {
        let a = submitted.as_bytes();
        let b = enrolled.as_bytes();
        if a.is_empty() || a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}
